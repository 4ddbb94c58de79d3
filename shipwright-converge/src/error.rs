//! Error types for shipwright-converge.

use std::path::PathBuf;

use thiserror::Error;

use shipwright_core::{ConfigError, RunnerError};
use shipwright_renderer::RenderError;

use crate::resource::{Action, ResourceId, ResourceType};

/// All errors that abort a convergence run.
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// Two declarations share the same `(type, key)`.
    #[error("configuration error: {id} declared twice")]
    DuplicateResource { id: ResourceId },

    /// A notification points at a resource that was never declared.
    #[error("configuration error: {notifier} notifies {action} on undeclared {target}")]
    UnknownNotificationTarget {
        notifier: ResourceId,
        action: Action,
        target: ResourceId,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// The guard command itself could not run (distinct from a negative result).
    #[error("guard for {resource} could not run: {source}")]
    GuardExecution {
        resource: ResourceId,
        #[source]
        source: RunnerError,
    },

    #[error("failed to apply {resource}: {source}")]
    ResourceApply {
        resource: ResourceId,
        #[source]
        source: ApplyError,
    },
}

impl ConvergeError {
    /// True for errors raised before any side effect.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ConvergeError::DuplicateResource { .. }
                | ConvergeError::UnknownNotificationTarget { .. }
                | ConvergeError::Config(_)
                | ConvergeError::Render(_)
        )
    }
}

/// Failure reported by a resource-type handler.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {code:?}: {output}")]
    Command {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("{kind} does not support action {action}")]
    Unsupported { kind: ResourceType, action: Action },

    /// Refusing to replace something the resource does not own.
    #[error("refusing to replace {path}: {reason}")]
    Conflict { path: PathBuf, reason: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ApplyError {
    ApplyError::Io {
        path: path.into(),
        source,
    }
}
