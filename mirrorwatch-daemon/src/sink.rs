use mirrorwatch_sync::{CycleSummary, ReportSink, RestartStatus};

/// Publishes cycle summaries to the daemon log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn publish(&self, summary: &CycleSummary) {
        for report in &summary.reports {
            let files: Vec<String> = report
                .changed_files
                .iter()
                .map(|path| path.display().to_string())
                .collect();
            match &report.restart {
                RestartStatus::Failed { message } => tracing::warn!(
                    group = %report.group_name,
                    version = %report.version,
                    files = ?files,
                    error = %message,
                    "group changed but restart was not confirmed",
                ),
                status => tracing::info!(
                    group = %report.group_name,
                    version = %report.version,
                    files = ?files,
                    restart = ?status,
                    apply_enabled = summary.apply_enabled,
                    "group changed",
                ),
            }
        }
        for failure in &summary.failures {
            tracing::warn!(failure = %failure, "cycle failure");
        }
        if !summary.has_changes() && summary.failures.is_empty() {
            tracing::debug!(duration_ms = summary.duration_ms(), "cycle found no drift");
        }
    }
}
