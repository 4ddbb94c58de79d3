//! File-backed application config source.
//!
//! # Storage layout
//!
//! ```text
//! <root>/
//!   host.yaml            (optional host settings)
//!   apps/
//!     <name>.yaml        (one descriptor per application, mode 0600)
//!   files/               (static files referenced by the app plan)
//! ```
//!
//! Descriptors are validated here, at the boundary, so the rest of the
//! system only ever sees well-formed input.

use std::path::{Path, PathBuf};

use crate::error::{io_err, ConfigError};
use crate::types::ApplicationDescriptor;

/// Environment variable overriding the default config root.
pub const ROOT_ENV: &str = "SHIPWRIGHT_ROOT";
pub const DEFAULT_ROOT: &str = "/etc/shipwright";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<root>/apps/`
pub fn apps_dir_at(root: &Path) -> PathBuf {
    root.join("apps")
}

/// `<root>/apps/<name>.yaml`: pure, no I/O.
pub fn descriptor_path_at(root: &Path, name: &str) -> PathBuf {
    apps_dir_at(root).join(format!("{name}.yaml"))
}

// ---------------------------------------------------------------------------
// 2. List / load
// ---------------------------------------------------------------------------

/// Names of every declared application, sorted.
pub fn list_names_at(root: &Path) -> Result<Vec<String>, ConfigError> {
    let dir = apps_dir_at(root);
    if !dir.exists() {
        return Ok(vec![]);
    }
    let entries = std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))?;
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.strip_suffix(".yaml").map(str::to_owned)
        })
        .collect();
    names.sort();
    Ok(names)
}

/// Load and validate the descriptor declared as `name`.
///
/// Returns `ConfigError::AppNotFound` if absent, `ConfigError::Parse`
/// (with path) if malformed, and a field error if validation fails.
pub fn load_at(root: &Path, name: &str) -> Result<ApplicationDescriptor, ConfigError> {
    let path = descriptor_path_at(root, name);
    if !path.exists() {
        return Err(ConfigError::AppNotFound {
            name: name.to_string(),
            path,
        });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let descriptor: ApplicationDescriptor =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    descriptor.validate()?;
    Ok(descriptor)
}

/// Load every declared application in name order.
pub fn load_all_at(root: &Path) -> Result<Vec<(String, ApplicationDescriptor)>, ConfigError> {
    list_names_at(root)?
        .into_iter()
        .map(|name| load_at(root, &name).map(|d| (name, d)))
        .collect()
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save a descriptor to `<root>/apps/<name>.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(
    root: &Path,
    name: &str,
    descriptor: &ApplicationDescriptor,
) -> Result<(), ConfigError> {
    let dir = apps_dir_at(root);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    let path = descriptor_path_at(root, name);
    let tmp_path = path.with_file_name(format!("{name}.yaml.tmp"));

    let yaml = serde_yaml::to_string(descriptor)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn descriptor() -> ApplicationDescriptor {
        let env: BTreeMap<String, String> = [
            ("DATABASE_NAME", "blog_prod"),
            ("DATABASE_USERNAME", "blog"),
            ("DATABASE_PASSWORD", "pw"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        ApplicationDescriptor {
            id: "blog".into(),
            environment: "prod".into(),
            repository: "git@example.com:blog.git".into(),
            revision: "r42".into(),
            ruby_version: "1.9.3".into(),
            ssl_enabled: true,
            delayed_job: false,
            server_names: vec!["blog.example.com".into()],
            environment_variables: env,
        }
    }

    #[test]
    fn descriptor_path_is_correct() {
        let root = TempDir::new().unwrap();
        assert!(descriptor_path_at(root.path(), "blog").ends_with("apps/blog.yaml"));
    }

    #[test]
    fn list_is_empty_without_apps_dir() {
        let root = TempDir::new().unwrap();
        assert!(list_names_at(root.path()).unwrap().is_empty());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let root = TempDir::new().unwrap();
        save_at(root.path(), "blog", &descriptor()).unwrap();
        let loaded = load_at(root.path(), "blog").unwrap();
        assert_eq!(loaded, descriptor());
        let tmp = descriptor_path_at(root.path(), "blog").with_file_name("blog.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn list_ignores_non_yaml_and_sorts() {
        let root = TempDir::new().unwrap();
        save_at(root.path(), "wiki", &descriptor()).unwrap();
        save_at(root.path(), "blog", &descriptor()).unwrap();
        std::fs::write(apps_dir_at(root.path()).join("README"), "x").unwrap();
        assert_eq!(list_names_at(root.path()).unwrap(), vec!["blog", "wiki"]);
    }

    #[test]
    fn load_missing_returns_not_found() {
        let root = TempDir::new().unwrap();
        let err = load_at(root.path(), "nope").unwrap_err();
        assert!(matches!(err, ConfigError::AppNotFound { .. }));
    }
}
