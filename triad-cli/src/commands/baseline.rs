//! `triad baseline <name>`

use anyhow::{Context, Result};
use clap::Args;

use crate::monitor::LoggingMonitor;

/// Arguments for `triad baseline`.
#[derive(Args, Debug)]
pub struct BaselineArgs {
    /// Subscriber to baseline.
    pub name: String,
}

impl BaselineArgs {
    pub fn run(self) -> Result<()> {
        let workspace = super::open_workspace(&self.name)?;
        let written = workspace
            .baseline(&mut LoggingMonitor::new())
            .with_context(|| format!("baseline failed for '{}'", self.name))?;

        println!(
            "✓ '{}' baselined ({written} entries from {})",
            self.name,
            workspace.config().local_root.display()
        );
        println!("  Saved to: {}", workspace.store().path().display());
        Ok(())
    }
}
