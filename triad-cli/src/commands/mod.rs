pub mod baseline;
pub mod init;
pub mod refresh;
pub mod status;

use std::sync::Arc;

use anyhow::{Context, Result};

use triad_core::config;
use triad_fs::FsWorkspace;
use triad_sync::ConcurrencyCoordinator;

/// Load subscriber `name` and assemble its workspace.
pub(crate) fn open_workspace(name: &str) -> Result<FsWorkspace> {
    let config = config::load(name)
        .with_context(|| format!("failed to load subscriber '{name}'; run `triad init` first"))?;
    FsWorkspace::open(config, Arc::new(ConcurrencyCoordinator::new()))
        .with_context(|| format!("failed to open workspace for '{name}'"))
}
