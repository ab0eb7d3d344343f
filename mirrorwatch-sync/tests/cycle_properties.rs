//! End-to-end cycle behaviour: idempotence, convergence, gate-off
//! non-mutation, group aggregation, restart call counts and restart retry.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use mirrorwatch_core::types::{Credentials, FilePair, ServiceGroup};
use mirrorwatch_sync::{
    reconcile, NotifyError, RestartNotifier, RestartStatus, SyncEngine, VersionExtractor,
};
use tempfile::TempDir;

/// Records every restart target it is asked to notify. The first
/// `unavailable_for` calls answer 503.
#[derive(Default)]
struct RecordingNotifier {
    targets: Mutex<Vec<String>>,
    unavailable_for: usize,
}

impl RecordingNotifier {
    fn calls(&self) -> Vec<String> {
        self.targets.lock().expect("lock").clone()
    }
}

impl RestartNotifier for RecordingNotifier {
    fn notify(&self, target: &str, credentials: &Credentials) -> Result<(), NotifyError> {
        assert_eq!(credentials.username, "operator");
        let mut targets = self.targets.lock().expect("lock");
        targets.push(target.to_string());
        if targets.len() <= self.unavailable_for {
            return Err(NotifyError::Status {
                url: target.to_string(),
                status: 503,
            });
        }
        Ok(())
    }
}

fn engine() -> SyncEngine<RecordingNotifier> {
    engine_with(RecordingNotifier::default())
}

fn engine_with(notifier: RecordingNotifier) -> SyncEngine<RecordingNotifier> {
    SyncEngine::new(
        VersionExtractor::default(),
        Credentials::new("operator", "pw"),
        notifier,
    )
}

fn write_pair(root: &Path, name: &str, local: &[u8], reference: &[u8]) -> FilePair {
    let local_path = root.join("deploy").join(name);
    let reference_path = root.join("mirror").join(name);
    fs::create_dir_all(local_path.parent().unwrap()).expect("mkdir deploy");
    fs::create_dir_all(reference_path.parent().unwrap()).expect("mkdir mirror");
    fs::write(&local_path, local).expect("write local");
    fs::write(&reference_path, reference).expect("write reference");
    FilePair::new(local_path, reference_path)
}

/// A strategy file with `version` on line 69.
fn strategy_source(version: &str) -> String {
    let mut lines: Vec<String> = (1..69).map(|n| format!("# line {n}")).collect();
    lines.push(format!("        return \"{version}\""));
    lines.push("# eof".to_string());
    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// File-level properties
// ---------------------------------------------------------------------------

#[test]
fn equal_bytes_are_unchanged_regardless_of_gate() {
    let tmp = TempDir::new().expect("tmp");
    let pair = write_pair(tmp.path(), "a.py", b"same\n", b"same\n");
    for apply in [false, true] {
        let result = reconcile(&pair, apply, &VersionExtractor::default()).expect("reconcile");
        assert!(!result.changed, "apply={apply}");
    }
}

#[test]
fn apply_converges_and_then_reports_unchanged() {
    let tmp = TempDir::new().expect("tmp");
    let pair = write_pair(tmp.path(), "a.py", b"old\n", b"new\n");
    let extractor = VersionExtractor::default();

    assert!(reconcile(&pair, true, &extractor).expect("first").changed);
    assert_eq!(
        fs::read(&pair.local_path).expect("read local"),
        fs::read(&pair.reference_path).expect("read reference")
    );
    assert!(!reconcile(&pair, true, &extractor).expect("second").changed);
}

#[test]
fn gate_off_never_mutates_local_bytes() {
    let tmp = TempDir::new().expect("tmp");
    let pair = write_pair(tmp.path(), "a.py", b"old\n", b"new\n");
    for _ in 0..3 {
        let result = reconcile(&pair, false, &VersionExtractor::default()).expect("reconcile");
        assert!(result.changed);
        assert_eq!(fs::read(&pair.local_path).expect("read"), b"old\n".to_vec());
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn version_bump_is_copied_and_then_extracted() {
    let tmp = TempDir::new().expect("tmp");
    let pair = write_pair(
        tmp.path(),
        "Strategy.py",
        strategy_source("v1.0.0").as_bytes(),
        strategy_source("v1.1.0").as_bytes(),
    )
    .tracking_version();
    let extractor = VersionExtractor::default();

    assert_eq!(extractor.extract_file(&pair.local_path), "v1.0.0");
    let result = reconcile(&pair, true, &extractor).expect("reconcile");
    assert!(result.changed);
    assert_eq!(extractor.extract_file(&pair.local_path), "v1.1.0");
    assert_eq!(result.local_version, "v1.1.0");
}

#[test]
fn one_changed_file_of_two_restarts_once_and_lists_only_that_file() {
    let tmp = TempDir::new().expect("tmp");
    let unchanged = write_pair(tmp.path(), "config.json", b"{}", b"{}");
    let changed = write_pair(tmp.path(), "strategy.py", b"v1", b"v2");
    let mut groups = vec![ServiceGroup::new("nfi", "http://127.0.0.1:8080")
        .with_file(unchanged)
        .with_file(changed.clone())];
    let engine = engine();

    let summary = engine.run(&mut groups, true);

    assert_eq!(summary.reports.len(), 1);
    let report = &summary.reports[0];
    assert_eq!(report.group_name.0, "nfi");
    assert_eq!(report.changed_files, vec![changed.local_path.clone()]);
    assert_eq!(report.restart, RestartStatus::Confirmed);
    assert_eq!(engine.notifier().calls(), vec!["http://127.0.0.1:8080"]);
}

#[test]
fn gate_disabled_reports_drift_without_write_or_restart() {
    let tmp = TempDir::new().expect("tmp");
    let pair = write_pair(tmp.path(), "strategy.py", b"local", b"reference");
    let mut groups = vec![ServiceGroup::new("nfi", "http://127.0.0.1:8080").with_file(pair.clone())];
    let engine = engine();

    let summary = engine.run(&mut groups, false);

    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.reports[0].restart, RestartStatus::Skipped);
    assert_eq!(fs::read(&pair.local_path).expect("read"), b"local".to_vec());
    assert!(engine.notifier().calls().is_empty());
    assert!(groups[0].files[0].updated, "drift is recorded on the pair");
}

// ---------------------------------------------------------------------------
// Aggregation and idempotence
// ---------------------------------------------------------------------------

#[test]
fn every_changed_file_still_means_one_restart() {
    let tmp = TempDir::new().expect("tmp");
    let mut group = ServiceGroup::new("bot", "http://bot.svc");
    for n in 0..5 {
        group = group.with_file(write_pair(tmp.path(), &format!("f{n}"), b"a", b"b"));
    }
    let mut groups = vec![group];
    let engine = engine();

    let summary = engine.run(&mut groups, true);

    assert_eq!(summary.reports[0].changed_files.len(), 5);
    assert_eq!(engine.notifier().calls().len(), 1);
}

#[test]
fn all_unchanged_group_triggers_zero_restarts() {
    let tmp = TempDir::new().expect("tmp");
    let mut group = ServiceGroup::new("bot", "http://bot.svc");
    for n in 0..3 {
        group = group.with_file(write_pair(tmp.path(), &format!("f{n}"), b"x", b"x"));
    }
    let mut groups = vec![group];
    let engine = engine();

    let summary = engine.run(&mut groups, true);

    assert!(!summary.has_changes());
    assert!(engine.notifier().calls().is_empty());
}

#[test]
fn second_applying_run_reports_nothing() {
    let tmp = TempDir::new().expect("tmp");
    let mut groups = vec![
        ServiceGroup::new("a", "http://a.svc")
            .with_file(write_pair(tmp.path(), "a1", b"1", b"2"))
            .with_file(write_pair(tmp.path(), "a2", b"1", b"1")),
        ServiceGroup::new("b", "http://b.svc").with_file(write_pair(tmp.path(), "b1", b"x", b"y")),
    ];
    let engine = engine();

    let first = engine.run(&mut groups, true);
    assert_eq!(first.reports.len(), 2);

    let second = engine.run(&mut groups, true);
    assert!(second.reports.is_empty());
    assert!(groups
        .iter()
        .flat_map(|g| g.files.iter())
        .all(|pair| !pair.updated));
    assert_eq!(engine.notifier().calls().len(), 2);
}

#[test]
fn unreadable_pair_is_reported_and_cycle_continues() {
    let tmp = TempDir::new().expect("tmp");
    let missing = FilePair::new(
        tmp.path().join("deploy/missing.py"),
        tmp.path().join("mirror/missing.py"),
    );
    let mut groups = vec![
        ServiceGroup::new("broken", "http://broken.svc").with_file(missing),
        ServiceGroup::new("fine", "http://fine.svc")
            .with_file(write_pair(tmp.path(), "ok.py", b"1", b"2")),
    ];
    let engine = engine();

    let summary = engine.run(&mut groups, true);

    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].starts_with("broken: "));
    assert!(!summary.failures[0].contains('\n'));
    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.reports[0].group_name.0, "fine");
    assert_eq!(engine.notifier().calls(), vec!["http://fine.svc"]);
}

#[test]
fn failed_restart_is_retried_by_the_next_applying_cycle() {
    let tmp = TempDir::new().expect("tmp");
    let pair = write_pair(tmp.path(), "strategy.py", b"v1", b"v2");
    let mut groups = vec![ServiceGroup::new("bot", "http://svc").with_file(pair.clone())];
    let engine = engine_with(RecordingNotifier {
        unavailable_for: 1,
        ..RecordingNotifier::default()
    });

    let first = engine.run(&mut groups, true);
    assert!(matches!(first.reports[0].restart, RestartStatus::Failed { .. }));
    assert_eq!(first.failures.len(), 1);
    assert_eq!(fs::read(&pair.local_path).expect("read"), b"v2".to_vec());
    assert!(groups[0].restart_pending);

    let second = engine.run(&mut groups, true);
    assert_eq!(second.reports.len(), 1);
    assert!(second.reports[0].changed_files.is_empty());
    assert_eq!(second.reports[0].restart, RestartStatus::Confirmed);
    assert!(second.failures.is_empty());
    assert!(!groups[0].restart_pending);
    assert_eq!(engine.notifier().calls().len(), 2);

    let third = engine.run(&mut groups, true);
    assert!(third.reports.is_empty());
    assert_eq!(engine.notifier().calls().len(), 2);
}
