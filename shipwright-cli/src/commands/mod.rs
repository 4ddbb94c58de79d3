pub mod apps;
pub mod deploy;
pub mod exit;
pub mod plan;
pub mod releases;
pub mod rollback;

use std::path::Path;

use anyhow::{Context, Result};

use shipwright_core::{settings, source, ApplicationDescriptor, HostSettings};

/// Host settings and the named descriptor, both validated.
pub fn load_app(root: &Path, name: &str) -> Result<(HostSettings, ApplicationDescriptor)> {
    let settings = settings::load_at(root)
        .with_context(|| format!("failed to load host settings from {}", root.display()))?;
    let descriptor =
        source::load_at(root, name).with_context(|| format!("failed to load application '{name}'"))?;
    Ok((settings, descriptor))
}
