//! Shipwright core library: descriptors, host settings, config source and
//! the command-runner seam.
//!
//! - [`types`]: [`ApplicationDescriptor`] and the derived [`AppName`]
//! - [`settings`]: [`HostSettings`] loaded from `host.yaml`
//! - [`source`]: list / load / save descriptors under `<root>/apps/`
//! - [`runner`]: [`CommandRunner`], [`ShellRunner`], [`ScriptedRunner`]
//! - [`error`]: [`ConfigError`], [`RunnerError`]

pub mod error;
pub mod runner;
pub mod settings;
pub mod source;
pub mod types;

pub use error::{ConfigError, RunnerError};
pub use runner::{shell_quote, CommandOutput, CommandRunner, CommandSpec, ScriptedRunner, ShellRunner};
pub use settings::HostSettings;
pub use types::{AppName, ApplicationDescriptor, DatabaseCredentials};
