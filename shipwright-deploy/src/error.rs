use std::path::PathBuf;

use thiserror::Error;

use shipwright_converge::ConvergeError;
use shipwright_core::{ConfigError, RunnerError};
use shipwright_renderer::RenderError;

/// Release directory and `current` pointer failures.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed release history {path}: {source}")]
    History {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("fetch of {revision} failed: {reason}")]
    Fetch { revision: String, reason: String },

    #[error("cannot link {path}: {reason}")]
    Link { path: PathBuf, reason: String },

    #[error("cannot activate release {release}: {reason}")]
    Activate { release: String, reason: String },

    #[error("unknown release {id}")]
    UnknownRelease { id: String },

    #[error("no earlier release to roll back to")]
    NoPreviousRelease,
}

/// A hook that did not pass.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook `{hook}` exited with {code:?}: {output}")]
    Failed {
        hook: String,
        code: Option<i32>,
        output: String,
    },

    #[error("hook `{hook}` could not run: {source}")]
    Runner {
        hook: String,
        #[source]
        source: RunnerError,
    },
}

impl HookError {
    pub fn hook(&self) -> &str {
        match self {
            HookError::Failed { hook, .. } | HookError::Runner { hook, .. } => hook,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("deployed {expected}, but the service answered {observed:?}")]
    Mismatch {
        expected: String,
        observed: String,
        trace: String,
    },

    #[error("version endpoint {url} unreachable: {reason}")]
    Unreachable {
        url: String,
        reason: String,
        trace: String,
    },
}

impl ProbeError {
    pub fn trace(&self) -> &str {
        match self {
            ProbeError::Mismatch { trace, .. } | ProbeError::Unreachable { trace, .. } => trace,
        }
    }
}

/// Errors that stop a pipeline before the deploy state machine reports an
/// outcome of its own.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Converge(#[from] ConvergeError),

    #[error(transparent)]
    Release(#[from] ReleaseError),

    #[error("restart failed: {0}")]
    Restart(#[source] HookError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ReleaseError {
    ReleaseError::Io {
        path: path.into(),
        source,
    }
}
