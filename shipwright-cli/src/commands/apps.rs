//! `shipwright apps`: configured applications at a glance.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use shipwright_core::{settings, source};
use shipwright_deploy::current_release;

/// Arguments for `shipwright apps`.
#[derive(Args, Debug)]
pub struct AppsArgs {}

#[derive(Tabled)]
struct AppRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "revision")]
    revision: String,
    #[tabled(rename = "server")]
    server: String,
    #[tabled(rename = "ssl")]
    ssl: &'static str,
    #[tabled(rename = "delayed_job")]
    delayed_job: &'static str,
    #[tabled(rename = "current")]
    current: String,
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

impl AppsArgs {
    pub fn run(self, root: &Path) -> Result<ExitCode> {
        let settings = settings::load_at(root).context("failed to load host settings")?;
        let apps = source::load_all_at(root).context("failed to load applications")?;
        if apps.is_empty() {
            println!(
                "No applications configured under {}",
                source::apps_dir_at(root).display()
            );
            return Ok(ExitCode::SUCCESS);
        }

        let rows: Vec<AppRow> = apps
            .into_iter()
            .map(|(name, d)| AppRow {
                current: current_release(&settings.deploy_to(&d.app_name()))
                    .unwrap_or_else(|| "-".to_string()),
                revision: d.revision.clone(),
                server: d.primary_server_name().unwrap_or("-").to_string(),
                ssl: yes_no(d.ssl_enabled),
                delayed_job: yes_no(d.delayed_job),
                name,
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(ExitCode::SUCCESS)
    }
}
