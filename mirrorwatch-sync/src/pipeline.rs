//! Shared cycle entrypoint used by the CLI and the daemon worker.

use mirrorwatch_core::types::{GroupName, ServiceGroup};

use crate::{CycleSummary, RestartNotifier, SyncEngine, SyncError};

/// Scope for a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Reconcile every configured group.
    All,
    /// Reconcile a single named group.
    Group(GroupName),
}

impl SyncScope {
    pub fn label(&self) -> String {
        match self {
            SyncScope::All => "all".to_string(),
            SyncScope::Group(name) => name.0.clone(),
        }
    }
}

/// Run one cycle for a scope.
///
/// Returns `SyncError::UnknownGroup` when the scope names a group that is
/// not configured; nothing is reconciled in that case.
pub fn run<N: RestartNotifier>(
    engine: &SyncEngine<N>,
    groups: &mut [ServiceGroup],
    scope: &SyncScope,
    apply_enabled: bool,
) -> Result<CycleSummary, SyncError> {
    match scope {
        SyncScope::All => Ok(engine.run(groups, apply_enabled)),
        SyncScope::Group(name) => {
            if !groups.iter().any(|group| &group.name == name) {
                return Err(SyncError::UnknownGroup {
                    name: name.0.clone(),
                });
            }
            Ok(engine.run_filtered(groups, apply_enabled, |group| &group.name == name))
        }
    }
}

#[cfg(test)]
mod tests {
    use mirrorwatch_core::types::Credentials;

    use super::*;
    use crate::{NotifyError, VersionExtractor};

    struct Unreachable;

    impl RestartNotifier for Unreachable {
        fn notify(&self, target: &str, _credentials: &Credentials) -> Result<(), NotifyError> {
            Err(NotifyError::Transport {
                url: target.to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    fn engine() -> SyncEngine<Unreachable> {
        SyncEngine::new(VersionExtractor::default(), Credentials::default(), Unreachable)
    }

    #[test]
    fn run_all_with_no_groups_returns_empty_summary() {
        let summary = run(&engine(), &mut [], &SyncScope::All, true).expect("run");
        assert!(summary.reports.is_empty());
        assert!(summary.failures.is_empty());
    }

    #[test]
    fn unknown_group_is_an_error() {
        let mut groups = vec![ServiceGroup::new("bot", "http://svc")];
        let err = run(
            &engine(),
            &mut groups,
            &SyncScope::Group(GroupName::from("nope")),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::UnknownGroup { .. }));
        assert_eq!(err.to_string(), "unknown group 'nope'");
    }

    #[test]
    fn scope_labels() {
        assert_eq!(SyncScope::All.label(), "all");
        assert_eq!(SyncScope::Group(GroupName::from("nfi")).label(), "nfi");
    }
}
