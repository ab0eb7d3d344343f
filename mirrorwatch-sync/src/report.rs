//! Per-cycle reports and the sink they are handed to.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mirrorwatch_core::types::{GroupName, ServiceGroup};

/// What happened to a changed group's restart notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RestartStatus {
    /// Nothing changed, nothing to restart.
    NotNeeded,
    /// Drift observed with the gate off; no restart attempted.
    Skipped,
    /// The service acknowledged the reload.
    Confirmed,
    /// Files changed but the service did not acknowledge the reload.
    Failed { message: String },
}

impl RestartStatus {
    /// A notification was sent this cycle, whatever its outcome.
    pub fn attempted(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed { .. })
    }
}

/// Summary for one group that changed, or retried a pending restart, during
/// a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub group_name: GroupName,
    pub version: String,
    pub changed_files: Vec<PathBuf>,
    pub restart: RestartStatus,
}

/// Everything one reconciliation cycle produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub apply_enabled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per changed or restarted group, in configured order.
    pub reports: Vec<SyncReport>,
    /// One-line messages for skipped files and failed restarts.
    pub failures: Vec<String>,
}

impl CycleSummary {
    pub fn has_changes(&self) -> bool {
        !self.reports.is_empty()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Receives each cycle's summary for presentation to an operator.
pub trait ReportSink: Send + Sync {
    fn publish(&self, summary: &CycleSummary);
}

/// Operator view of a group's advisory state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStatus {
    pub name: GroupName,
    pub version: String,
    pub reference_version: String,
    pub updated_files: Vec<PathBuf>,
    /// Applied files still wait for a confirmed reload.
    #[serde(default)]
    pub restart_pending: bool,
}

impl From<&ServiceGroup> for GroupStatus {
    fn from(group: &ServiceGroup) -> Self {
        Self {
            name: group.name.clone(),
            version: group.version.clone(),
            reference_version: group.reference_version.clone(),
            updated_files: group.updated_paths(),
            restart_pending: group.restart_pending,
        }
    }
}
