//! Template context: serializable rendering payload built from an
//! [`ApplicationDescriptor`] and the [`HostSettings`] it is deployed under.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use shipwright_core::{ApplicationDescriptor, HostSettings};

use crate::error::RenderError;

/// Structured rendering payload shared by every template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateContext {
    pub app: AppCtx,
    pub server: ServerCtx,
    /// Merged environment exported by the process the template configures.
    pub environment_variables: BTreeMap<String, String>,
    pub worker: WorkerCtx,
    pub meta: MetaCtx,
}

/// Identity and on-disk layout of the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppCtx {
    /// `{id}-{environment}`
    pub name: String,
    pub id: String,
    pub environment: String,
    pub deploy_to: String,
    pub current_path: String,
    pub shared_path: String,
    pub stdout_log: String,
    pub stderr_log: String,
}

/// Virtual host settings for nginx.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCtx {
    pub names: Vec<String>,
    pub primary: String,
    pub ssl_enabled: bool,
}

/// Background worker supervision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerCtx {
    pub enabled: bool,
    pub count: u32,
    /// Base process name; worker `i` is `<name>.<i>`.
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaCtx {
    pub shipwright_version: String,
}

impl TemplateContext {
    /// Build a context whose environment logs to the `purpose` log file.
    pub fn for_app(
        descriptor: &ApplicationDescriptor,
        settings: &HostSettings,
        purpose: &str,
    ) -> Self {
        let app = descriptor.app_name();
        let deploy_to = settings.deploy_to(&app);

        TemplateContext {
            app: AppCtx {
                name: app.0.clone(),
                id: descriptor.id.clone(),
                environment: descriptor.environment.clone(),
                deploy_to: deploy_to.display().to_string(),
                current_path: deploy_to.join("current").display().to_string(),
                shared_path: deploy_to.join("shared").display().to_string(),
                stdout_log: settings.log_file(&app, "stdout").display().to_string(),
                stderr_log: settings.log_file(&app, "stderr").display().to_string(),
            },
            server: ServerCtx {
                names: descriptor.server_names.clone(),
                primary: descriptor
                    .primary_server_name()
                    .unwrap_or_default()
                    .to_string(),
                ssl_enabled: descriptor.ssl_enabled,
            },
            environment_variables: settings.app_environment(descriptor, purpose),
            worker: WorkerCtx {
                enabled: descriptor.delayed_job,
                count: settings.delayed_job_worker_count,
                name: format!("{}_delayed_job", app.0),
            },
            meta: MetaCtx {
                shipwright_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Convert to a [`tera::Context`] for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}
