//! mirrorwatch daemon runtime: timer + reference watcher + sync worker +
//! control socket.

mod error;
pub mod notifier;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod sink;

pub use error::DaemonError;
pub use notifier::HttpRestartNotifier;
pub use protocol::{
    request_gate, request_status, request_stop, request_sync, send_request, DaemonRequest,
    DaemonResponse,
};
pub use runtime::{init_tracing, run, run_with_notifier, start_blocking, StatusSnapshot};
pub use sink::LogSink;
