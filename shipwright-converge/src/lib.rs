//! # shipwright-converge
//!
//! Declared system resources brought to their target state once per run.
//!
//! - [`plan::app_plan`] declares everything an application needs into a
//!   [`ResourceRegistry`].
//! - [`ConvergenceEngine::run`] applies it in order, consulting each
//!   resource's guard through [`GuardEvaluator`], then fires deferred
//!   notifications once per `(target, action)`.
//! - [`SystemHandler`] is the handler that touches the real system; tests
//!   substitute their own [`ResourceHandler`].

pub mod engine;
pub mod error;
pub mod guard;
pub mod handler;
pub mod plan;
pub mod registry;
pub mod resource;
pub mod system;
pub mod writer;

pub use engine::{ConvergeReport, ConvergenceEngine, PendingNotifications, ResourceResult, ResourceStatus};
pub use error::{ApplyError, ConvergeError};
pub use guard::GuardEvaluator;
pub use handler::{ApplyOutcome, ResourceHandler};
pub use plan::app_plan;
pub use registry::{ResourceRegistry, ResourceSummary};
pub use resource::{
    Action, Content, Guard, GuardKind, Notification, Ownership, Resource, ResourceId, ResourceSpec,
    ResourceType,
};
pub use system::SystemHandler;
