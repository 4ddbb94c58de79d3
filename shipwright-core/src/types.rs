//! Domain types for an application deployed by Shipwright.
//!
//! All types are serializable/deserializable via serde + serde_yaml.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment keys that must be present when database resources are declared.
pub const DATABASE_NAME: &str = "DATABASE_NAME";
pub const DATABASE_USERNAME: &str = "DATABASE_USERNAME";
pub const DATABASE_PASSWORD: &str = "DATABASE_PASSWORD";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// The per-host identity of a deployed application: `"{id}-{environment}"`.
///
/// Used as the system username, directory name, service name and nginx site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppName(pub String);

impl AppName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for AppName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for AppName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// One application/environment pair as supplied by the config source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDescriptor {
    pub id: String,
    pub environment: String,
    /// VCS URL the release is fetched from.
    pub repository: String,
    /// Tag, branch or commit to deploy.
    pub revision: String,
    pub ruby_version: String,
    #[serde(default)]
    pub ssl_enabled: bool,
    /// Whether a monit-supervised background worker is configured.
    #[serde(default)]
    pub delayed_job: bool,
    /// First entry is the primary name (used for probing and backups).
    pub server_names: Vec<String>,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
}

/// Credentials pulled out of the descriptor's environment map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub name: String,
    pub username: String,
    pub password: String,
}

impl ApplicationDescriptor {
    /// `"{id}-{environment}"`. Pure and total.
    pub fn app_name(&self) -> AppName {
        AppName(format!("{}-{}", self.id, self.environment))
    }

    /// The first server name. `None` only for an unvalidated descriptor.
    pub fn primary_server_name(&self) -> Option<&str> {
        self.server_names.first().map(String::as_str)
    }

    pub fn database_credentials(&self) -> Result<DatabaseCredentials, ConfigError> {
        let get = |key: &str| {
            self.environment_variables
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| ConfigError::MissingField {
                    app: self.app_name().0,
                    field: format!("environment_variables.{key}"),
                })
        };
        Ok(DatabaseCredentials {
            name: get(DATABASE_NAME)?,
            username: get(DATABASE_USERNAME)?,
            password: get(DATABASE_PASSWORD)?,
        })
    }

    /// Boundary validation run by the config source before the descriptor
    /// enters the rest of the system.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let app = self.app_name().0;
        for (field, value) in [
            ("id", &self.id),
            ("environment", &self.environment),
            ("repository", &self.repository),
            ("revision", &self.revision),
            ("ruby_version", &self.ruby_version),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    app,
                    field: field.to_string(),
                });
            }
        }
        // The first entry is the primary name, so a blank anywhere counts.
        if self.server_names.is_empty() || self.server_names.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::MissingField {
                app,
                field: "server_names".to_string(),
            });
        }
        // The app name becomes a user, group, service and directory name.
        for (field, value) in [("id", &self.id), ("environment", &self.environment)] {
            if !is_identifier(value) {
                return Err(ConfigError::Invalid {
                    app,
                    reason: format!(
                        "{field} {value:?} must match [a-z0-9_][a-z0-9_.-]*"
                    ),
                });
            }
        }
        self.database_credentials()?;
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let lower = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_';
    lower(first) && chars.all(|c| lower(c) || c == '.' || c == '-')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
