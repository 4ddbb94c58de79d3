//! Tera rendering engine: [`TemplateKind`] enum and [`Renderer`].
//!
//! # Output paths
//!
//! | Template        | Output path                                         |
//! |-----------------|-----------------------------------------------------|
//! | InitScript      | `<init_dir>/<app>`                                  |
//! | NginxSite       | `<nginx_dir>/sites-available/<app>`                 |
//! | UnicornConfig   | `<www_root>/<app>/shared/config/unicorn.rb`         |
//! | DelayedJobMonit | `<monit_conf_dir>/delayed_job.<app>.conf`           |

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tera::Tera;

use shipwright_core::{AppName, ApplicationDescriptor, HostSettings};

use crate::context::TemplateContext;
use crate::error::RenderError;

// ---------------------------------------------------------------------------
// Embedded templates: baked into the binary at compile time via include_str!
// ---------------------------------------------------------------------------

const TPLS: &[(&str, &str)] = &[
    ("_partials/env_exports.tera", include_str!("templates/_partials/env_exports.tera")),
    ("unicorn/init.sh.tera", include_str!("templates/unicorn_init.sh.tera")),
    ("unicorn/unicorn.rb.tera", include_str!("templates/unicorn.rb.tera")),
    ("nginx/site.conf.tera", include_str!("templates/nginx_site.conf.tera")),
    ("monit/delayed_job.monitrc.tera", include_str!("templates/delayed_job.monitrc.tera")),
];

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io { path: path.into(), source }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

fn collect_template_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RenderError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            collect_template_files(&path, out)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut files = Vec::new();
    collect_template_files(dir, &mut files)?;
    let mut templates = Vec::new();
    for path in files {
        if path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
        let name = normalize_template_name(rel);
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        templates.push((name, contents));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = HashMap::new();
    for (name, content) in TPLS {
        templates.insert(
            normalize_template_name(Path::new(name)),
            (*content).to_string(),
        );
    }
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    let items: Vec<(String, String)> = templates.into_iter().collect();
    tera.add_raw_templates(items)?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// TemplateKind
// ---------------------------------------------------------------------------

/// Every config file Shipwright renders for an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    InitScript,
    NginxSite,
    UnicornConfig,
    DelayedJobMonit,
}

impl TemplateKind {
    /// All template variants in a stable order.
    pub fn all() -> &'static [TemplateKind] {
        &[
            TemplateKind::InitScript,
            TemplateKind::NginxSite,
            TemplateKind::UnicornConfig,
            TemplateKind::DelayedJobMonit,
        ]
    }

    pub fn template_name(&self) -> &'static str {
        match self {
            TemplateKind::InitScript      => "unicorn/init.sh.tera",
            TemplateKind::NginxSite       => "nginx/site.conf.tera",
            TemplateKind::UnicornConfig   => "unicorn/unicorn.rb.tera",
            TemplateKind::DelayedJobMonit => "monit/delayed_job.monitrc.tera",
        }
    }

    /// Which `LOG_FILE` the rendered process writes to.
    pub fn log_purpose(&self) -> &'static str {
        match self {
            TemplateKind::InitScript | TemplateKind::NginxSite => "application",
            TemplateKind::UnicornConfig => "chef",
            TemplateKind::DelayedJobMonit => "delayed_job",
        }
    }

    pub fn output_path(&self, settings: &HostSettings, app: &AppName) -> PathBuf {
        match self {
            TemplateKind::InitScript => settings.init_script(app),
            TemplateKind::NginxSite => settings
                .nginx_dir
                .join("sites-available")
                .join(app.as_str()),
            TemplateKind::UnicornConfig => settings
                .deploy_to(app)
                .join("shared")
                .join("config")
                .join("unicorn.rb"),
            TemplateKind::DelayedJobMonit => settings
                .monit_conf_dir
                .join(format!("delayed_job.{}.conf", app.as_str())),
        }
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Tera-based renderer with optional user overrides.
///
/// `user_template_dir` may contain `.tera` files named like the embedded
/// ones (e.g. `nginx/site.conf.tera`) that replace the defaults.
/// Create once with [`Renderer::new`] and reuse.
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        Ok(Renderer {
            tera: build_tera(user_template_dir)?,
        })
    }

    /// Render `kind` for `descriptor` with the environment matching the
    /// template's log purpose.
    pub fn render(
        &self,
        descriptor: &ApplicationDescriptor,
        settings: &HostSettings,
        kind: TemplateKind,
    ) -> Result<String, RenderError> {
        let ctx = TemplateContext::for_app(descriptor, settings, kind.log_purpose());
        self.render_with_context(&ctx, kind)
    }

    /// Render using a caller-provided [`TemplateContext`]. Output always has
    /// LF line endings.
    pub fn render_with_context(
        &self,
        ctx: &TemplateContext,
        kind: TemplateKind,
    ) -> Result<String, RenderError> {
        let tera_ctx = ctx.to_tera_context()?;
        let content = self.tera.render(kind.template_name(), &tera_ctx)?;
        Ok(content.replace("\r\n", "\n"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
