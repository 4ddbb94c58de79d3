//! # shipwright-renderer
//!
//! Tera-based engine that renders the configuration files an application
//! needs on the host: the unicorn init script, the nginx site, the unicorn
//! config linked into each release, and the monit config for background
//! workers.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use shipwright_core::{ApplicationDescriptor, HostSettings};
//! use shipwright_renderer::{Renderer, TemplateKind};
//!
//! fn render_all(descriptor: &ApplicationDescriptor, settings: &HostSettings) {
//!     if let Ok(renderer) = Renderer::new(settings.template_dir.as_deref()) {
//!         for kind in TemplateKind::all() {
//!             if let Ok(content) = renderer.render(descriptor, settings, *kind) {
//!                 let path = kind.output_path(settings, &descriptor.app_name());
//!                 println!("{}: {} bytes", path.display(), content.len());
//!             }
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::TemplateContext;
pub use engine::{Renderer, TemplateKind};
pub use error::RenderError;
