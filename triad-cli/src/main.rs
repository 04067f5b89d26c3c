//! Triad: three-way sync state for a working directory and its mirror.
//!
//! # Usage
//!
//! ```text
//! triad init <name> --local <dir> --remote <dir> [--selector TAG] [--ignore-whitespace] [--ignore PATTERN]...
//! triad list
//! triad baseline <name>
//! triad refresh <name> [--depth zero|one|infinite] [PATH...]
//! triad status <name> [--json]
//! ```

mod commands;
mod monitor;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    baseline::BaselineArgs, init::InitArgs, refresh::RefreshArgs, status::StatusArgs,
};
use triad_core::Depth;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "triad",
    version,
    about = "Track base, local and remote sync state of a working directory",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configure a subscriber over a working directory and a mirror.
    Init(InitArgs),

    /// List configured subscribers.
    List,

    /// Record the current working copy as the common ancestor.
    Baseline(BaselineArgs),

    /// Fetch remote state into the cache and report what changed.
    Refresh(RefreshArgs),

    /// Show out-of-sync resources from cached state.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Shared Depth argument
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `Depth` from CLI args.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthArg(pub Depth);

impl FromStr for DepthArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zero" | "0" => Ok(Self(Depth::Zero)),
            "one" | "1" => Ok(Self(Depth::One)),
            "infinite" | "inf" => Ok(Self(Depth::Infinite)),
            other => Err(format!(
                "unknown depth '{other}'; expected: zero, one, infinite"
            )),
        }
    }
}

impl fmt::Display for DepthArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::List => commands::init::list(),
        Commands::Baseline(args) => args.run(),
        Commands::Refresh(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}
