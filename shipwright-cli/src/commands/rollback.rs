//! `shipwright rollback`: operator-initiated return to an earlier release.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use shipwright_core::ShellRunner;
use shipwright_deploy::{git_fetcher, HttpVersionProbe, Pipeline};

use super::deploy::acquire_lock;
use super::{exit, load_app};

/// Arguments for `shipwright rollback`.
#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// Application name as declared under `apps/`.
    pub app: String,

    /// Release id to return to; defaults to the most recent superseded one.
    #[arg(long)]
    pub to: Option<String>,
}

impl RollbackArgs {
    pub fn run(self, root: &Path) -> Result<ExitCode> {
        let (settings, descriptor) = load_app(root, &self.app)?;
        let app = descriptor.app_name();

        let Some(_lock) = acquire_lock(&settings, &app)? else {
            eprintln!("{} a deploy of '{app}' is in progress", "✗".red());
            return Ok(ExitCode::from(exit::LOCKED));
        };

        let runner = ShellRunner::new(Some(settings.command_timeout()))
            .context("failed to start the command runner")?;
        let fetcher = git_fetcher(&settings, &descriptor, &runner);
        let probe = HttpVersionProbe::new(settings.probe_host.clone(), settings.probe_timeout());
        let restored = Pipeline::new(&settings, &runner, &fetcher, &probe)
            .rollback(&descriptor, self.to.as_deref())
            .with_context(|| format!("rollback of '{app}' failed"))?;

        tracing::info!(app = %app, release = %restored, "operator rollback");
        println!("{} '{app}' rolled back to {restored}", "✓".green());
        Ok(ExitCode::SUCCESS)
    }
}
