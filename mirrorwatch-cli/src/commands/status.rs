//! `mirrorwatch status`: per-group drift and version visibility.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use mirrorwatch_daemon::{request_status, DaemonError};
use mirrorwatch_sync::GroupStatus;

use super::{http_engine, GlobalOpts};

/// Arguments for `mirrorwatch status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, opts: &GlobalOpts) -> Result<()> {
        let report = match request_status(&opts.home) {
            Ok(payload) => from_daemon(&payload)?,
            Err(DaemonError::DaemonNotRunning { .. }) => scan(opts)?,
            Err(err) => return Err(err).context("failed to query daemon status"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(&report);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    /// `daemon` when read from a running daemon, `scan` for a local pass.
    source: &'static str,
    apply_enabled: bool,
    last_cycle_at: Option<DateTime<Utc>>,
    groups: Vec<GroupStatus>,
    failures: Vec<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "group")]
    group: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "reference")]
    reference_version: String,
    #[tabled(rename = "drifted files")]
    drifted: String,
}

fn from_daemon(payload: &Value) -> Result<StatusReport> {
    let groups: Vec<GroupStatus> = serde_json::from_value(payload["groups"].clone())
        .context("daemon status has no readable group list")?;
    let last_cycle = &payload["last_cycle"];
    let last_cycle_at = last_cycle["finished_at"]
        .as_str()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc));
    let failures = last_cycle["failures"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(StatusReport {
        source: "daemon",
        apply_enabled: payload["apply_enabled"].as_bool().unwrap_or(false),
        last_cycle_at,
        groups,
        failures,
    })
}

/// Observe-only cycle in this process; never writes or restarts.
fn scan(opts: &GlobalOpts) -> Result<StatusReport> {
    let config = opts.load_config()?;
    let engine = http_engine(&config);
    let mut groups = config.groups.clone();
    let summary = engine.run(&mut groups, false);

    Ok(StatusReport {
        source: "scan",
        apply_enabled: config.apply_enabled,
        last_cycle_at: Some(summary.finished_at),
        groups: groups.iter().map(GroupStatus::from).collect(),
        failures: summary.failures,
    })
}

fn print_table(report: &StatusReport) {
    let drifted = report
        .groups
        .iter()
        .filter(|group| !group.updated_files.is_empty())
        .count();
    let gate = if report.apply_enabled {
        "apply enabled".green().bold()
    } else {
        "apply disabled".yellow().bold()
    };
    let last_cycle = report
        .last_cycle_at
        .map(format_age)
        .unwrap_or_else(|| "never".to_string());
    println!(
        "mirrorwatch v{} | {} | {} groups | {} drifted | last cycle {} ({})",
        env!("CARGO_PKG_VERSION"),
        gate,
        report.groups.len(),
        drifted,
        last_cycle,
        report.source,
    );

    if report.groups.is_empty() {
        println!("No groups reported yet.");
        return;
    }

    let rows: Vec<StatusTableRow> = report
        .groups
        .iter()
        .map(|group| StatusTableRow {
            group: group.name.0.clone(),
            state: if !group.updated_files.is_empty() {
                "DRIFT".red().bold().to_string()
            } else if group.restart_pending {
                "RESTART PENDING".yellow().bold().to_string()
            } else {
                "IN SYNC".green().to_string()
            },
            version: or_dash(&group.version),
            reference_version: or_dash(&group.reference_version),
            drifted: summarize_files(&group.updated_files),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    for failure in &report.failures {
        println!("{} {failure}", "✗".red().bold());
    }
    if drifted > 0 && !report.apply_enabled {
        println!("Run 'mirrorwatch sync --apply' or 'mirrorwatch daemon enable' to apply changes.");
    }
}

fn or_dash(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

fn summarize_files(files: &[PathBuf]) -> String {
    if files.is_empty() {
        return "-".to_string();
    }

    let mut names: Vec<String> = files
        .iter()
        .take(2)
        .map(|path| path.display().to_string())
        .collect();
    if files.len() > names.len() {
        names.push(format!("+{} more", files.len() - names.len()));
    }
    names.join(", ")
}

fn format_age(at: DateTime<Utc>) -> String {
    let secs = (Utc::now() - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
