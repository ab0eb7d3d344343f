//! Synchronization engine: one reconciliation cycle over all groups.

use chrono::Utc;

use mirrorwatch_core::types::{Config, Credentials, ServiceGroup};

use crate::group::reconcile_group;
use crate::notifier::RestartNotifier;
use crate::report::{CycleSummary, SyncReport};
use crate::version::VersionExtractor;

/// Runs reconciliation cycles.
///
/// The engine holds only collaborators. Group state lives in the slice the
/// caller passes in, and the apply gate arrives as a parameter, so each
/// cycle's outcome depends on nothing but its inputs and the filesystem.
#[derive(Debug)]
pub struct SyncEngine<N> {
    extractor: VersionExtractor,
    credentials: Credentials,
    notifier: N,
}

impl<N: RestartNotifier> SyncEngine<N> {
    pub fn new(extractor: VersionExtractor, credentials: Credentials, notifier: N) -> Self {
        Self {
            extractor,
            credentials,
            notifier,
        }
    }

    pub fn from_config(config: &Config, notifier: N) -> Self {
        Self::new(
            VersionExtractor::from(&config.version),
            config.credentials.clone(),
            notifier,
        )
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Reconcile every group in order.
    ///
    /// Produces one [`SyncReport`] per changed group, plus one per group whose
    /// pending restart was retried. Errors are isolated per
    /// file and per group and collected into `failures`.
    pub fn run(&self, groups: &mut [ServiceGroup], apply_enabled: bool) -> CycleSummary {
        self.run_filtered(groups, apply_enabled, |_| true)
    }

    /// Reconcile only the groups accepted by `include`.
    pub fn run_filtered<F>(
        &self,
        groups: &mut [ServiceGroup],
        apply_enabled: bool,
        include: F,
    ) -> CycleSummary
    where
        F: Fn(&ServiceGroup) -> bool,
    {
        let started_at = Utc::now();
        let mut reports = Vec::new();
        let mut failures = Vec::new();

        for group in groups.iter_mut().filter(|group| include(group)) {
            let outcome = reconcile_group(
                group,
                apply_enabled,
                &self.extractor,
                &self.credentials,
                &self.notifier,
            );
            failures.extend(outcome.failures);
            if outcome.changed || outcome.restart.attempted() {
                reports.push(SyncReport {
                    group_name: outcome.name,
                    version: group.version.clone(),
                    changed_files: outcome.changed_files,
                    restart: outcome.restart,
                });
            }
        }

        let summary = CycleSummary {
            apply_enabled,
            started_at,
            finished_at: Utc::now(),
            reports,
            failures,
        };
        tracing::info!(
            "cycle finished: apply={} changed_groups={} failures={} duration_ms={}",
            apply_enabled,
            summary.reports.len(),
            summary.failures.len(),
            summary.duration_ms()
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mirrorwatch_core::types::FilePair;
    use tempfile::TempDir;

    use super::*;
    use crate::notifier::NotifyError;
    use crate::report::RestartStatus;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl RestartNotifier for Counter {
        fn notify(&self, _target: &str, _credentials: &Credentials) -> Result<(), NotifyError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn group_with(dir: &TempDir, name: &str, local: &str, reference: &str) -> ServiceGroup {
        let local_path = dir.path().join(format!("{name}.local"));
        let reference_path = dir.path().join(format!("{name}.ref"));
        fs::write(&local_path, local).unwrap();
        fs::write(&reference_path, reference).unwrap();
        ServiceGroup::new(name, format!("http://{name}.svc"))
            .with_file(FilePair::new(local_path, reference_path))
    }

    #[test]
    fn unchanged_groups_produce_no_report() {
        let dir = TempDir::new().unwrap();
        let mut groups = vec![
            group_with(&dir, "alpha", "same", "same"),
            group_with(&dir, "beta", "old", "new"),
            group_with(&dir, "gamma", "same", "same"),
        ];
        let engine = SyncEngine::new(
            VersionExtractor::default(),
            Credentials::default(),
            Counter::default(),
        );

        let summary = engine.run(&mut groups, true);

        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].group_name.0, "beta");
        assert_eq!(summary.reports[0].restart, RestartStatus::Confirmed);
        assert_eq!(engine.notifier().0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reports_follow_configured_order() {
        let dir = TempDir::new().unwrap();
        let mut groups = vec![
            group_with(&dir, "zeta", "1", "2"),
            group_with(&dir, "alpha", "1", "2"),
        ];
        let engine = SyncEngine::new(
            VersionExtractor::default(),
            Credentials::default(),
            Counter::default(),
        );

        let summary = engine.run(&mut groups, false);

        let names: Vec<_> = summary
            .reports
            .iter()
            .map(|r| r.group_name.0.as_str())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert!(!summary.apply_enabled);
    }

    #[test]
    fn run_filtered_leaves_other_groups_untouched() {
        let dir = TempDir::new().unwrap();
        let mut groups = vec![
            group_with(&dir, "alpha", "1", "2"),
            group_with(&dir, "beta", "1", "2"),
        ];
        let engine = SyncEngine::new(
            VersionExtractor::default(),
            Credentials::default(),
            Counter::default(),
        );

        let summary = engine.run_filtered(&mut groups, true, |g| g.name.0 == "beta");

        assert_eq!(summary.reports.len(), 1);
        assert_eq!(
            fs::read_to_string(&groups[0].files[0].local_path).unwrap(),
            "1"
        );
        assert_eq!(
            fs::read_to_string(&groups[1].files[0].local_path).unwrap(),
            "2"
        );
    }
}
