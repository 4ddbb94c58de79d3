//! Shipwright: converge a host for an application, then deploy it.
//!
//! # Usage
//!
//! ```text
//! shipwright [--root <dir>] [--log-json] deploy <app> [--skip-deploy] [--no-verify] [--json]
//! shipwright apps
//! shipwright plan <app> [--json]
//! shipwright releases <app> [--json]
//! shipwright rollback <app> [--to <release>]
//! ```

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use shipwright_core::source;

use commands::{
    apps::AppsArgs, deploy::DeployArgs, exit, plan::PlanArgs, releases::ReleasesArgs,
    rollback::RollbackArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "shipwright",
    version,
    about = "Converge application hosts and ship releases",
    long_about = None,
)]
struct Cli {
    /// Config root holding `host.yaml` and `apps/`.
    #[arg(long, global = true, env = source::ROOT_ENV, default_value = source::DEFAULT_ROOT)]
    root: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Converge the host for an application, then deploy its revision.
    Deploy(DeployArgs),

    /// List configured applications.
    Apps(AppsArgs),

    /// Show the resources an application declares, without applying them.
    Plan(PlanArgs),

    /// Show an application's release history.
    Releases(ReleasesArgs),

    /// Point `current` back at an earlier release and restart.
    Rollback(RollbackArgs),
}

fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn run(cli: Cli) -> Result<ExitCode> {
    let root = cli.root;
    match cli.command {
        Commands::Deploy(args) => args.run(&root),
        Commands::Apps(args) => args.run(&root),
        Commands::Plan(args) => args.run(&root),
        Commands::Releases(args) => args.run(&root),
        Commands::Rollback(args) => args.run(&root),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::from(exit::for_error(&e))
        }
    }
}
