//! `triad refresh <name> [--depth ...] [PATH...]`

use anyhow::{Context, Result};
use clap::Args;

use triad_core::Resource;

use crate::monitor::LoggingMonitor;
use crate::DepthArg;

/// Arguments for `triad refresh`.
#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Subscriber to refresh.
    pub name: String,

    /// Workspace-relative paths to refresh; defaults to every project.
    pub paths: Vec<String>,

    /// How far below each path to look: zero, one or infinite.
    #[arg(long, short = 'd', default_value = "infinite", value_name = "DEPTH")]
    pub depth: DepthArg,
}

impl RefreshArgs {
    pub fn run(self) -> Result<()> {
        let workspace = super::open_workspace(&self.name)?;
        let resources = if self.paths.is_empty() {
            vec![Resource::root()]
        } else {
            self.paths
                .iter()
                .map(|p| workspace.resource(p))
                .collect::<Result<Vec<_>, _>>()
                .context("failed to resolve paths")?
        };

        let changed = workspace
            .refresh(&resources, self.depth.0, &mut LoggingMonitor::new())
            .with_context(|| format!("refresh failed for '{}'", self.name))?;

        if changed.is_empty() {
            println!("✓ '{}' refreshed: no remote changes", self.name);
            return Ok(());
        }
        println!("✓ '{}' refreshed ({} changed)", self.name, changed.len());
        for resource in &changed {
            println!("  ↻  {resource}");
        }
        Ok(())
    }
}
