//! # mirrorwatch-sync
//!
//! Drift detection and reconciliation between deployed files and their
//! reference copies.
//!
//! Call [`SyncEngine::run`] to reconcile every configured group once, or
//! [`pipeline::run`] to restrict a cycle to one group. The apply gate is a
//! plain `bool` parameter; [`ControlGate`] holds the process-wide value.

pub mod diff;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod gate;
pub mod group;
pub mod notifier;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod version;

pub use diff::{diff_group, FileDiff, GroupDiff};
pub use engine::SyncEngine;
pub use error::SyncError;
pub use fingerprint::{fingerprint_file, Fingerprint};
pub use gate::ControlGate;
pub use notifier::{NotifyError, RestartNotifier};
pub use pipeline::SyncScope;
pub use reconcile::{reconcile, ReconcileResult};
pub use report::{CycleSummary, GroupStatus, ReportSink, RestartStatus, SyncReport};
pub use version::VersionExtractor;
