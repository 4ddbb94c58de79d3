//! `shipwright releases`: release history for one application.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use shipwright_deploy::{current_release, history, ReleaseStatus};

use super::load_app;

/// Arguments for `shipwright releases`.
#[derive(Args, Debug)]
pub struct ReleasesArgs {
    /// Application name as declared under `apps/`.
    pub app: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ReleaseRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "release")]
    id: String,
    #[tabled(rename = "revision")]
    revision: String,
    #[tabled(rename = "commit")]
    commit: String,
    #[tabled(rename = "created")]
    created: String,
    #[tabled(rename = "status")]
    status: String,
}

impl ReleasesArgs {
    pub fn run(self, root: &Path) -> Result<ExitCode> {
        let (settings, descriptor) = load_app(root, &self.app)?;
        let deploy_to = settings.deploy_to(&descriptor.app_name());
        let history = history::load_at(&deploy_to)
            .with_context(|| format!("failed to read release history of '{}'", self.app))?;
        let current = current_release(&deploy_to);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&history.releases)?);
            return Ok(ExitCode::SUCCESS);
        }
        if history.releases.is_empty() {
            println!("No releases of '{}' yet", self.app);
            return Ok(ExitCode::SUCCESS);
        }

        let rows: Vec<ReleaseRow> = history
            .releases
            .iter()
            .rev()
            .map(|r| ReleaseRow {
                marker: if current.as_deref() == Some(r.id.as_str()) {
                    "*"
                } else {
                    ""
                },
                id: r.id.clone(),
                revision: r.revision.clone(),
                commit: r.commit.chars().take(12).collect(),
                created: r.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                status: match r.status {
                    ReleaseStatus::Active => r.status.to_string().green().to_string(),
                    ReleaseStatus::Failed => r.status.to_string().red().to_string(),
                    _ => r.status.to_string(),
                },
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(ExitCode::SUCCESS)
    }
}
