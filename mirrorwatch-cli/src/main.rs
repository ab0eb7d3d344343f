//! mirrorwatch: keep deployed files in step with a reference mirror.
//!
//! # Usage
//!
//! ```text
//! mirrorwatch sync [--group <name>] [--dry-run | --apply]
//! mirrorwatch status [--json]
//! mirrorwatch diff [--group <name>]
//! mirrorwatch check
//! mirrorwatch daemon start|stop|status|sync|enable|disable
//! ```
//!
//! Every command accepts `--config <path>` (default
//! `~/.mirrorwatch/config.yaml`) and `--log-json`.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    check::CheckArgs, daemon::DaemonCommand, diff::DiffArgs, status::StatusArgs, sync::SyncArgs,
    GlobalOpts,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "mirrorwatch",
    version,
    about = "Reconcile deployed files against a reference mirror and reload services",
    long_about = None,
)]
struct Cli {
    /// Configuration file to use instead of ~/.mirrorwatch/config.yaml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit log records as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one reconciliation cycle in this process.
    Sync(SyncArgs),

    /// Show per-group drift and versions.
    Status(StatusArgs),

    /// Show unified diffs between deployed and reference files.
    Diff(DiffArgs),

    /// Validate the configuration file.
    Check(CheckArgs),

    /// Run and control the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let opts = GlobalOpts::resolve(cli.config, cli.log_json)?;
    match cli.command {
        Commands::Sync(args) => args.run(&opts),
        Commands::Status(args) => args.run(&opts),
        Commands::Diff(args) => args.run(&opts),
        Commands::Check(args) => args.run(&opts),
        Commands::Daemon { command } => commands::daemon::run(command, &opts),
    }
}
