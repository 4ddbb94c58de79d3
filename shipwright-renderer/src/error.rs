use std::path::PathBuf;

use thiserror::Error;

/// Failures while loading or rendering host config templates.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A template failed to parse (embedded or override) or referenced a
    /// value the application context does not provide.
    #[error("template error: {0}")]
    Tera(#[from] tera::Error),

    /// An override under `template_dir` could not be read.
    #[error("cannot read template override {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
