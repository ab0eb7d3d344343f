//! Remote restart collaborator.

use std::sync::Arc;

use thiserror::Error;

use mirrorwatch_core::types::Credentials;

/// A restart notification that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The service answered with something other than success.
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },
}

/// Tells a service that its files changed and it should reload.
///
/// Called at most once per changed group per cycle. Implementations must
/// bound their own latency; the engine does not time them out.
pub trait RestartNotifier: Send + Sync {
    fn notify(&self, target: &str, credentials: &Credentials) -> Result<(), NotifyError>;
}

impl<T: RestartNotifier + ?Sized> RestartNotifier for Arc<T> {
    fn notify(&self, target: &str, credentials: &Credentials) -> Result<(), NotifyError> {
        (**self).notify(target, credentials)
    }
}

impl<T: RestartNotifier + ?Sized> RestartNotifier for &T {
    fn notify(&self, target: &str, credentials: &Credentials) -> Result<(), NotifyError> {
        (**self).notify(target, credentials)
    }
}
