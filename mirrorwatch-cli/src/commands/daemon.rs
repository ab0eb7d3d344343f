//! `mirrorwatch daemon`: background runtime lifecycle and control.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value;

use mirrorwatch_daemon::paths::socket_path;
use mirrorwatch_daemon::{
    request_gate, request_status, request_stop, request_sync, start_blocking, DaemonError,
};

use super::GlobalOpts;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run daemon in foreground (timer + watcher + socket server).
    Start,
    /// Request graceful daemon shutdown over Unix socket.
    Stop,
    /// Query daemon runtime status over Unix socket.
    Status,
    /// Ask the daemon to run a cycle now and print its summary.
    Sync(DaemonSyncArgs),
    /// Let the daemon write files and restart services.
    Enable,
    /// Switch the daemon to observe-only.
    Disable,
}

#[derive(Args, Debug)]
pub struct DaemonSyncArgs {
    /// Reconcile only this group.
    #[arg(long)]
    pub group: Option<String>,

    /// Apply changes for this cycle even while the daemon is disabled.
    #[arg(long)]
    pub force: bool,
}

pub fn run(command: DaemonCommand, opts: &GlobalOpts) -> Result<()> {
    let home = &opts.home;

    match command {
        DaemonCommand::Start => {
            start_blocking(home, &opts.config_path, opts.log_json)
                .context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(home) {
            Ok(status) => print_json(&status)?,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(home).display().to_string(),
                });
                print_json(&payload)?;
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Sync(args) => {
            let summary = request_sync(home, args.group, args.force)
                .context("daemon sync request failed")?;
            print_json(&summary)?;
        }
        DaemonCommand::Enable => {
            let state = request_gate(home, true).context("failed to enable daemon")?;
            println!("apply enabled{}", previously(&state));
        }
        DaemonCommand::Disable => {
            let state = request_gate(home, false).context("failed to disable daemon")?;
            println!("apply disabled{}", previously(&state));
        }
    }

    Ok(())
}

fn previously(state: &Value) -> &'static str {
    match state["previous"].as_bool() {
        Some(true) => " (was enabled)",
        Some(false) => " (was disabled)",
        None => "",
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render daemon JSON")?
    );
    Ok(())
}
