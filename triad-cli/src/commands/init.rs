//! `triad init <name> --local <dir> --remote <dir> [...]` and `triad list`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;

use triad_core::{config, SubscriberConfig};

/// Configure a subscriber.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Subscriber name; becomes `~/.triad/subscribers/<name>.yaml`.
    pub name: String,

    /// Working directory whose subdirectories are the supervised projects.
    #[arg(long, short = 'l', value_name = "DIR")]
    pub local: PathBuf,

    /// Directory mirroring the upstream state.
    #[arg(long, short = 'r', value_name = "DIR")]
    pub remote: PathBuf,

    /// Tag or branch the mirror is read at.
    #[arg(long, short = 's', value_name = "TAG")]
    pub selector: Option<String>,

    /// Treat content differing only in whitespace as equal.
    #[arg(long)]
    pub ignore_whitespace: bool,

    /// Name or `*.ext` pattern to exclude; repeatable.
    #[arg(long = "ignore", value_name = "PATTERN")]
    pub ignore: Vec<String>,

    /// Replace an existing configuration.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = config::home().context("could not determine home directory")?;
        let path = config::config_path_at(&home, &self.name);
        if path.exists() && !self.force {
            bail!(
                "subscriber '{}' already exists at {} (use --force to replace it)",
                self.name,
                path.display()
            );
        }

        let local = resolve_dir(&self.local)?;
        let remote = resolve_dir(&self.remote)?;
        let mut subscriber = SubscriberConfig::new(self.name.clone(), local, remote);
        subscriber.selector = self.selector;
        subscriber.ignore_whitespace = self.ignore_whitespace;
        subscriber.ignore = self.ignore;

        config::save(&subscriber)
            .with_context(|| format!("failed to save subscriber '{}'", self.name))?;

        println!("✓ Configured subscriber '{}'", subscriber.name);
        println!("  local:  {}", subscriber.local_root.display());
        println!("  remote: {}", subscriber.remote_root.display());
        println!("  Saved to: {}", path.display());
        println!("Run 'triad baseline {}' to record the common ancestor.", subscriber.name);
        Ok(())
    }
}

fn resolve_dir(path: &Path) -> Result<PathBuf> {
    let resolved = path
        .canonicalize()
        .with_context(|| format!("cannot resolve path '{}'", path.display()))?;
    if !resolved.is_dir() {
        bail!("'{}' is not a directory", path.display());
    }
    Ok(resolved)
}

/// `triad list`
pub fn list() -> Result<()> {
    let configs = config::list().context("failed to read subscriber configs")?;
    if configs.is_empty() {
        println!("No subscribers configured. Run `triad init` first.");
        return Ok(());
    }
    for subscriber in configs {
        let selector = subscriber
            .selector
            .map(|s| format!(" @ {s}"))
            .unwrap_or_default();
        println!(
            "{}  {} ⇄ {}{selector}",
            subscriber.name,
            subscriber.local_root.display(),
            subscriber.remote_root.display(),
        );
    }
    Ok(())
}
