//! # shipwright-deploy
//!
//! Release-based deploys under `<www_root>/<app_name>`:
//!
//! ```text
//! <deploy_to>/
//!   releases/<id>/    one checkout per deploy, with a REVISION file
//!   shared/           state that outlives releases, linked into each one
//!   current ->        the live release, only ever replaced atomically
//!   releases.json     release history
//! ```
//!
//! [`ReleaseManager`] owns that layout. [`DeployStateMachine`] drives one
//! attempt through fetch, link, hooks, activation, restart and verification.
//! [`Pipeline`] converges the host first and then runs the machine.
//!
//! Only one deploy per application may run at a time; callers serialise
//! them (the CLI holds a lock file).

pub mod error;
pub mod fetch;
pub mod history;
pub mod hooks;
pub mod machine;
pub mod paths;
pub mod pipeline;
pub mod probe;
pub mod release;

pub use error::{DeployError, HookError, ProbeError, ReleaseError};
pub use fetch::{Fetcher, GitFetcher};
pub use history::{ReleaseHistory, ReleaseRecord, ReleaseStatus};
pub use hooks::Hook;
pub use machine::{
    CancelFlag, DeployEvent, DeployFailure, DeployOutcome, DeployReport, DeployStateMachine,
    DeployStep, Rollback,
};
pub use pipeline::{git_fetcher, Pipeline, PipelineOptions, PipelineReport};
pub use probe::{HttpVersionProbe, VersionProbe};
pub use release::{current_release, Release, ReleaseManager};
