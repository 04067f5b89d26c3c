//! `triad status <name>`: out-of-sync resources from cached state.
//!
//! Never contacts the mirror; run `triad refresh` first for current remote
//! state.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use triad_core::ResourceKind;
use triad_sync::{SyncInfo, SyncKind};

use crate::monitor::LoggingMonitor;

/// Arguments for `triad status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Subscriber to report on.
    pub name: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let workspace = super::open_workspace(&self.name)?;
        let infos = workspace
            .status(&mut LoggingMonitor::new())
            .with_context(|| format!("status failed for '{}'", self.name))?;
        let saved_at = workspace.store().synced_at();

        if self.json {
            return print_json(&self.name, &infos);
        }

        println!(
            "Triad v{} | {} | {} out of sync | state saved {}",
            env!("CARGO_PKG_VERSION"),
            self.name,
            infos.len(),
            saved_at.format("%Y-%m-%d %H:%M:%S UTC"),
        );
        print_table(&infos);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    subscriber: &'a str,
    out_of_sync: usize,
    resources: Vec<ResourceJson>,
}

#[derive(Serialize)]
struct ResourceJson {
    path: String,
    kind: ResourceKind,
    direction: &'static str,
    change: Option<String>,
    pseudo: bool,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "")]
    indicator: String,
    #[tabled(rename = "resource")]
    resource: String,
    #[tabled(rename = "state")]
    state: String,
}

fn print_json(name: &str, infos: &[SyncInfo]) -> Result<()> {
    let payload = StatusJson {
        subscriber: name,
        out_of_sync: infos.len(),
        resources: infos
            .iter()
            .map(|info| ResourceJson {
                path: info.resource.path.to_string(),
                kind: info.resource.kind,
                direction: direction_key(&info.kind),
                change: info.kind.change().map(|c| c.to_string()),
                pseudo: matches!(info.kind, SyncKind::Conflicting { pseudo: true, .. }),
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(infos: &[SyncInfo]) {
    if infos.is_empty() {
        println!("{} everything in sync", indicator(&SyncKind::InSync));
        return;
    }
    let rows: Vec<StatusTableRow> = infos
        .iter()
        .map(|info| StatusTableRow {
            indicator: indicator(&info.kind),
            resource: info.resource.to_string(),
            state: info.kind.to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn direction_key(kind: &SyncKind) -> &'static str {
    match kind {
        SyncKind::InSync => "in_sync",
        SyncKind::Incoming(_) => "incoming",
        SyncKind::Outgoing(_) => "outgoing",
        SyncKind::Conflicting { .. } => "conflicting",
    }
}

fn indicator(kind: &SyncKind) -> String {
    match kind {
        SyncKind::InSync => "■".green().bold().to_string(),
        SyncKind::Incoming(_) => "■".cyan().bold().to_string(),
        SyncKind::Outgoing(_) => "■".blue().bold().to_string(),
        SyncKind::Conflicting { pseudo: true, .. } => "■".yellow().bold().to_string(),
        SyncKind::Conflicting { .. } => "■".red().bold().to_string(),
    }
}
