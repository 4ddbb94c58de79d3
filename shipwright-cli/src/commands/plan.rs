//! `shipwright plan`: the resources an application declares, in apply
//! order, without touching the system.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use shipwright_converge::{app_plan, GuardKind, ResourceSummary};
use shipwright_renderer::Renderer;

use super::load_app;

/// Arguments for `shipwright plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Application name as declared under `apps/`.
    pub app: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "resource")]
    resource: String,
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "guard")]
    guard: String,
    #[tabled(rename = "notifies")]
    notifies: String,
}

impl PlanArgs {
    pub fn run(self, root: &Path) -> Result<ExitCode> {
        let (settings, descriptor) = load_app(root, &self.app)?;
        let renderer = Renderer::new(settings.template_dir.as_deref())
            .context("failed to load templates")?;
        let registry = app_plan(&descriptor, &settings, &renderer)
            .with_context(|| format!("failed to plan '{}'", self.app))?;
        let summaries = registry.summaries();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
            return Ok(ExitCode::SUCCESS);
        }

        let rows: Vec<PlanRow> = summaries.iter().enumerate().map(row).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(ExitCode::SUCCESS)
    }
}

fn row((i, s): (usize, &ResourceSummary)) -> PlanRow {
    let guard = match s.guard.as_ref() {
        None => String::new(),
        Some(g) => {
            let kind = match g.kind {
                GuardKind::NotIf => "not_if",
                GuardKind::OnlyIf => "only_if",
            };
            format!("{kind} {}", g.command)
        }
    };
    let notifies = s
        .notifies
        .iter()
        .map(|n| format!("{} {}", n.action, n.target))
        .collect::<Vec<_>>()
        .join(", ");
    PlanRow {
        index: i + 1,
        resource: s.id.clone(),
        action: s.action.to_string(),
        guard,
        notifies,
    }
}
