//! `mirrorwatch sync`: run one reconciliation cycle.
//!
//! A running daemon owns the deployed files, so applying cycles are handed to
//! it over the control socket. Without a daemon, or for `--dry-run`, the cycle
//! runs in this process.

use anyhow::{Context, Result};
use clap::Args;

use mirrorwatch_core::types::GroupName;
use mirrorwatch_daemon::{request_sync, DaemonError};
use mirrorwatch_sync::{
    pipeline::{self, SyncScope},
    CycleSummary, RestartStatus,
};

use super::{http_engine, GlobalOpts};

/// Arguments for `mirrorwatch sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Reconcile only this group.
    #[arg(long)]
    pub group: Option<String>,

    /// Report drift without writing files or restarting services.
    #[arg(long)]
    pub dry_run: bool,

    /// Apply changes even if `apply_enabled` is off in the configuration.
    #[arg(long, conflicts_with = "dry_run")]
    pub apply: bool,
}

impl SyncArgs {
    pub fn run(self, opts: &GlobalOpts) -> Result<()> {
        mirrorwatch_daemon::init_tracing(opts.log_json);
        if !self.dry_run {
            if let Some(summary) = self.submit_to_daemon(opts)? {
                println!("→ cycle ran in the mirrorwatch daemon");
                print_summary(&summary);
                return Ok(());
            }
        }

        let config = opts.load_config()?;

        let apply_enabled = if self.dry_run {
            false
        } else {
            self.apply || config.apply_enabled
        };
        let scope = match self.group {
            Some(name) => SyncScope::Group(GroupName::from(name)),
            None => SyncScope::All,
        };

        let engine = http_engine(&config);
        let mut groups = config.groups.clone();
        let summary = pipeline::run(&engine, &mut groups, &scope, apply_enabled)
            .with_context(|| format!("sync failed for '{}'", scope.label()))?;

        print_summary(&summary);
        Ok(())
    }

    /// `None` when no daemon is listening.
    fn submit_to_daemon(&self, opts: &GlobalOpts) -> Result<Option<CycleSummary>> {
        let payload = match request_sync(&opts.home, self.group.clone(), self.apply) {
            Ok(payload) => payload,
            Err(DaemonError::DaemonNotRunning { .. }) => return Ok(None),
            Err(err) => return Err(err).context("daemon sync request failed"),
        };
        let summary = serde_json::from_value(payload)
            .context("daemon returned an unreadable cycle summary")?;
        Ok(Some(summary))
    }
}

pub(crate) fn print_summary(summary: &CycleSummary) {
    let prefix = if summary.apply_enabled {
        ""
    } else {
        "[dry-run] "
    };

    if summary.reports.is_empty() {
        println!("{prefix}✓ nothing to do ({} ms)", summary.duration_ms());
    }

    for report in &summary.reports {
        let version = if report.version.is_empty() {
            String::new()
        } else {
            format!(" {}", report.version)
        };
        println!(
            "{prefix}✓ '{}'{version}: {} file(s) changed, {}",
            report.group_name,
            report.changed_files.len(),
            restart_label(&report.restart),
        );
        let marker = if summary.apply_enabled { "✎" } else { "~" };
        for path in &report.changed_files {
            println!("  {marker}  {}", path.display());
        }
    }

    for failure in &summary.failures {
        eprintln!("✗ {failure}");
    }
}

fn restart_label(status: &RestartStatus) -> String {
    match status {
        RestartStatus::NotNeeded => "no restart needed".to_string(),
        RestartStatus::Skipped => "restart skipped (apply disabled)".to_string(),
        RestartStatus::Confirmed => "restart confirmed".to_string(),
        RestartStatus::Failed { message } => format!("restart FAILED: {message}"),
    }
}
