//! Service group aggregation.
//!
//! Reconciles every file of one group, folds the per-file results into a
//! single change flag, and issues at most one restart notification. A restart
//! that fails stays pending on the group and is retried by the next applying
//! cycle, even if the files already match by then.

use std::path::PathBuf;

use mirrorwatch_core::types::{Credentials, GroupName, ServiceGroup};

use crate::notifier::RestartNotifier;
use crate::reconcile::{read_versions, reconcile};
use crate::report::RestartStatus;
use crate::version::VersionExtractor;

/// Result of reconciling one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutcome {
    pub name: GroupName,
    /// At least one file reported drift.
    pub changed: bool,
    /// Local paths that drifted, in configured order.
    pub changed_files: Vec<PathBuf>,
    pub restart: RestartStatus,
    /// One-line operator messages.
    pub failures: Vec<String>,
}

/// Reconcile all files of `group`.
///
/// Per-file errors are logged and recorded; they never abort the group. The
/// group's `version`/`reference_version` end up holding the last
/// version-tracked file's values.
pub fn reconcile_group<N: RestartNotifier + ?Sized>(
    group: &mut ServiceGroup,
    apply_enabled: bool,
    extractor: &VersionExtractor,
    credentials: &Credentials,
    notifier: &N,
) -> GroupOutcome {
    let mut changed_files = Vec::new();
    let mut failures = Vec::new();
    let mut versions = None;

    for pair in group.files.iter_mut() {
        match reconcile(pair, apply_enabled, extractor) {
            Ok(result) => {
                pair.updated = result.changed;
                if result.changed {
                    changed_files.push(pair.local_path.clone());
                }
                if pair.tracks_version {
                    versions = Some((result.local_version, result.reference_version));
                }
            }
            Err(err) => {
                tracing::warn!(
                    "group {}: skipping {}: {}",
                    group.name,
                    pair.local_path.display(),
                    err
                );
                failures.push(format!("{}: {}", group.name, err.summary()));
                if pair.tracks_version {
                    versions = Some(read_versions(pair, extractor));
                }
            }
        }
    }

    let changed = !changed_files.is_empty();
    let restart = if apply_enabled && (changed || group.restart_pending) {
        if !changed {
            tracing::info!("group {}: retrying unconfirmed restart", group.name);
        }
        match notifier.notify(&group.restart_target, credentials) {
            Ok(()) => {
                tracing::info!("group {}: restart confirmed", group.name);
                group.restart_pending = false;
                RestartStatus::Confirmed
            }
            Err(err) => {
                tracing::error!("group {}: restart failed: {}", group.name, err);
                failures.push(format!("{}: restart failed: {}", group.name, err));
                group.restart_pending = true;
                RestartStatus::Failed {
                    message: err.to_string(),
                }
            }
        }
    } else if changed {
        RestartStatus::Skipped
    } else {
        RestartStatus::NotNeeded
    };

    if let Some((local, reference)) = versions {
        group.version = local;
        group.reference_version = reference;
    }

    GroupOutcome {
        name: group.name.clone(),
        changed,
        changed_files,
        restart,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use mirrorwatch_core::types::FilePair;
    use tempfile::TempDir;

    use super::*;
    use crate::notifier::NotifyError;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RestartNotifier for Recorder {
        fn notify(&self, target: &str, _credentials: &Credentials) -> Result<(), NotifyError> {
            self.calls.lock().unwrap().push(target.to_string());
            if self.fail {
                return Err(NotifyError::Status {
                    url: target.to_string(),
                    status: 503,
                });
            }
            Ok(())
        }
    }

    fn pair(dir: &TempDir, name: &str, local: &str, reference: &str) -> FilePair {
        let local_path = dir.path().join(format!("{name}.local"));
        let reference_path = dir.path().join(format!("{name}.ref"));
        fs::write(&local_path, local).unwrap();
        fs::write(&reference_path, reference).unwrap();
        FilePair::new(local_path, reference_path)
    }

    #[test]
    fn unreadable_file_is_skipped_and_others_still_reconcile() {
        let dir = TempDir::new().unwrap();
        let broken = FilePair::new(dir.path().join("gone.local"), dir.path().join("gone.ref"));
        let drifted = pair(&dir, "b", "old", "new");
        let mut group = ServiceGroup::new("bot", "http://svc")
            .with_file(broken)
            .with_file(drifted.clone());
        let notifier = Recorder::default();

        let outcome = reconcile_group(
            &mut group,
            true,
            &VersionExtractor::default(),
            &Credentials::default(),
            &notifier,
        );

        assert!(outcome.changed);
        assert_eq!(outcome.changed_files, vec![drifted.local_path.clone()]);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].starts_with("bot: cannot access"));
        assert_eq!(fs::read_to_string(&drifted.local_path).unwrap(), "new");
    }

    #[test]
    fn failed_restart_is_reported_once_and_left_pending() {
        let dir = TempDir::new().unwrap();
        let mut group = ServiceGroup::new("bot", "http://svc")
            .with_file(pair(&dir, "a", "1", "2"))
            .with_file(pair(&dir, "b", "1", "2"));
        let notifier = Recorder {
            fail: true,
            ..Recorder::default()
        };

        let outcome = reconcile_group(
            &mut group,
            true,
            &VersionExtractor::default(),
            &Credentials::default(),
            &notifier,
        );

        assert_eq!(notifier.calls.lock().unwrap().len(), 1);
        assert!(matches!(outcome.restart, RestartStatus::Failed { .. }));
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].contains("503"));
        assert!(group.restart_pending);
    }

    #[test]
    fn pending_restart_is_retried_without_drift() {
        let dir = TempDir::new().unwrap();
        let mut group =
            ServiceGroup::new("bot", "http://svc").with_file(pair(&dir, "a", "x", "x"));
        group.restart_pending = true;
        let notifier = Recorder::default();

        let outcome = reconcile_group(
            &mut group,
            true,
            &VersionExtractor::default(),
            &Credentials::default(),
            &notifier,
        );

        assert!(!outcome.changed);
        assert_eq!(outcome.restart, RestartStatus::Confirmed);
        assert_eq!(notifier.calls.lock().unwrap().len(), 1);
        assert!(!group.restart_pending);
    }

    #[test]
    fn pending_restart_waits_while_gate_is_off() {
        let dir = TempDir::new().unwrap();
        let mut group =
            ServiceGroup::new("bot", "http://svc").with_file(pair(&dir, "a", "x", "x"));
        group.restart_pending = true;
        let notifier = Recorder::default();

        let outcome = reconcile_group(
            &mut group,
            false,
            &VersionExtractor::default(),
            &Credentials::default(),
            &notifier,
        );

        assert_eq!(outcome.restart, RestartStatus::NotNeeded);
        assert!(notifier.calls.lock().unwrap().is_empty());
        assert!(group.restart_pending);
    }

    #[test]
    fn last_tracked_file_sets_group_versions() {
        let dir = TempDir::new().unwrap();
        let first = pair(&dir, "a", "return \"v1\"", "return \"v2\"").tracking_version();
        let second = pair(&dir, "b", "return \"v7\"", "return \"v7\"").tracking_version();
        let untracked = pair(&dir, "c", "return \"v9\"", "return \"v9\"");
        let mut group = ServiceGroup::new("bot", "http://svc")
            .with_file(first)
            .with_file(second)
            .with_file(untracked);

        reconcile_group(
            &mut group,
            false,
            &VersionExtractor::new(1, "return \"v"),
            &Credentials::default(),
            &Recorder::default(),
        );

        assert_eq!(group.version, "v7");
        assert_eq!(group.reference_version, "v7");
    }

    #[test]
    fn versions_survive_when_no_file_tracks_one() {
        let dir = TempDir::new().unwrap();
        let mut group =
            ServiceGroup::new("bot", "http://svc").with_file(pair(&dir, "a", "x", "x"));
        group.version = "v3.0.0".to_string();

        reconcile_group(
            &mut group,
            true,
            &VersionExtractor::default(),
            &Credentials::default(),
            &Recorder::default(),
        );

        assert_eq!(group.version, "v3.0.0");
    }

    #[test]
    fn failed_file_keeps_previous_updated_flag() {
        let dir = TempDir::new().unwrap();
        let mut broken =
            FilePair::new(dir.path().join("gone.local"), dir.path().join("gone.ref"));
        broken.updated = true;
        let mut group = ServiceGroup::new("bot", "http://svc").with_file(broken);

        let outcome = reconcile_group(
            &mut group,
            true,
            &VersionExtractor::default(),
            &Credentials::default(),
            &Recorder::default(),
        );

        assert!(!outcome.changed);
        assert!(group.files[0].updated);
    }
}
