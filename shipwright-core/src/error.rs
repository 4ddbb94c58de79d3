//! Error types for shipwright-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// Every variant is fatal and is raised before any side effect.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// No descriptor file exists for the requested application.
    #[error("application '{name}' not found at {path}")]
    AppNotFound { name: String, path: PathBuf },

    #[error("application '{app}' is missing required field '{field}'")]
    MissingField { app: String, field: String },

    #[error("application '{app}' is invalid: {reason}")]
    Invalid { app: String, reason: String },
}

/// Failures to *run* an external command. A command that runs and exits
/// non-zero is not an error at this layer.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
