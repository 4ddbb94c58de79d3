//! `shipwright deploy`: converge, then run one deploy attempt.

use std::fs::File;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use fs2::FileExt;
use serde::Serialize;

use shipwright_converge::{ConvergeReport, ResourceStatus};
use shipwright_core::{AppName, HostSettings, ShellRunner};
use shipwright_deploy::{
    git_fetcher, CancelFlag, DeployFailure, DeployOutcome, DeployReport, HttpVersionProbe,
    Pipeline, PipelineOptions, Rollback,
};

use super::{exit, load_app};

/// Arguments for `shipwright deploy`.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Application name as declared under `apps/`.
    pub app: String,

    /// Converge only; leave releases alone.
    #[arg(long)]
    pub skip_deploy: bool,

    /// Do not probe `/version` after restarting.
    #[arg(long)]
    pub no_verify: bool,

    /// Emit the full report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct DeployJson<'a> {
    app: &'a str,
    converge: &'a ConvergeReport,
    deploy: Option<&'a DeployReport>,
    exit_code: u8,
}

/// Exclusive per-app lock held for the whole run. `None` when another
/// deploy holds it.
pub fn acquire_lock(settings: &HostSettings, app: &AppName) -> Result<Option<File>> {
    let path = settings.lock_path(app);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = File::create(&path).with_context(|| format!("failed to open {}", path.display()))?;
    if file.try_lock_exclusive().is_err() {
        return Ok(None);
    }
    Ok(Some(file))
}

impl DeployArgs {
    pub fn run(self, root: &Path) -> Result<ExitCode> {
        let (settings, descriptor) = load_app(root, &self.app)?;
        let app = descriptor.app_name();

        let Some(lock) = acquire_lock(&settings, &app)? else {
            eprintln!(
                "{} another deploy of '{app}' holds {}",
                "✗".red(),
                settings.lock_path(&app).display()
            );
            return Ok(ExitCode::from(exit::LOCKED));
        };

        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        ctrlc::set_handler(move || flag.cancel()).context("failed to install Ctrl-C handler")?;

        let runner = ShellRunner::new(Some(settings.command_timeout()))
            .context("failed to start the command runner")?;
        let fetcher = git_fetcher(&settings, &descriptor, &runner);
        let probe = HttpVersionProbe::new(settings.probe_host.clone(), settings.probe_timeout());
        let report = Pipeline::new(&settings, &runner, &fetcher, &probe)
            .options(PipelineOptions {
                deploy: !self.skip_deploy,
                verify: !self.no_verify,
            })
            .cancel_flag(cancel)
            .run(&descriptor)
            .with_context(|| format!("deploy of '{app}' failed"))?;
        let _ = lock.unlock();

        let code = report
            .deploy
            .as_ref()
            .map_or(exit::SUCCESS, |d| exit::for_outcome(&d.outcome));

        if self.json {
            let json = DeployJson {
                app: app.as_str(),
                converge: &report.converge,
                deploy: report.deploy.as_ref(),
                exit_code: code,
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        } else {
            print_converge(&app, &report.converge);
            if let Some(deploy) = report.deploy.as_ref() {
                print_deploy(&app, deploy);
            }
        }
        Ok(ExitCode::from(code))
    }
}

fn print_converge(app: &AppName, report: &ConvergeReport) {
    println!(
        "✓ '{app}' converged ({} updated, {} unchanged, {} skipped)",
        report.count(ResourceStatus::Updated),
        report.count(ResourceStatus::Unchanged),
        report.count(ResourceStatus::Skipped),
    );
    for r in report
        .resources
        .iter()
        .filter(|r| r.status == ResourceStatus::Updated)
    {
        println!("  ✎  {} ({})", r.id, r.action);
    }
    for n in &report.notifications {
        println!("  ↻  {} {}", n.action, n.target);
    }
}

fn print_deploy(app: &AppName, report: &DeployReport) {
    let release = report.release.as_deref().unwrap_or("-");
    for warning in report.warnings() {
        println!("  {} {warning}", "!".yellow());
    }
    match &report.outcome {
        DeployOutcome::Succeeded => {
            println!(
                "{} '{app}' deployed release {release} ({})",
                "✓".green(),
                report.commit.as_deref().unwrap_or("-")
            );
        }
        DeployOutcome::RolledBack { restored, cause } => {
            println!("{} '{app}' restart failed: {cause}", "✗".red());
            println!("  rolled back to {restored}; the previous release is serving");
        }
        DeployOutcome::Cancelled { step, rollback } => {
            println!("{} '{app}' cancelled during {step}", "✗".yellow());
            if let Some(rollback) = rollback {
                print_rollback(rollback);
            }
        }
        DeployOutcome::Failed { step, failure } => {
            println!(
                "{} '{app}' failed at {step} (release {release}): {failure}",
                "✗".red()
            );
            match failure {
                DeployFailure::Restart { rollback, .. }
                | DeployFailure::Activate {
                    rollback: Some(rollback),
                    ..
                } => print_rollback(rollback),
                DeployFailure::VersionMismatch { trace, .. }
                | DeployFailure::ProbeUnreachable { trace, .. } => {
                    println!("  release stays live; no rollback attempted");
                    for line in trace.lines() {
                        println!("  {}", line.dimmed());
                    }
                }
                _ => println!("  current release untouched"),
            }
        }
    }
}

fn print_rollback(rollback: &Rollback) {
    match rollback {
        Rollback::Unavailable => println!("  no earlier release to roll back to"),
        Rollback::Restored { to } => println!("  rolled back to {to}"),
        Rollback::Failed { to, detail } => {
            println!("  {} rollback to {to} failed: {detail}", "✗".red())
        }
    }
}
