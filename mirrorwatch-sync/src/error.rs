//! Error types for mirrorwatch-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from reconciliation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A scoped run named a group that is not configured.
    #[error("unknown group '{name}'")]
    UnknownGroup { name: String },
}

impl SyncError {
    /// One-line operator-facing description without OS error text.
    pub fn summary(&self) -> String {
        match self {
            SyncError::Io { path, source } => {
                format!("cannot access {} ({})", path.display(), source.kind())
            }
            SyncError::UnknownGroup { name } => format!("unknown group '{name}'"),
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
