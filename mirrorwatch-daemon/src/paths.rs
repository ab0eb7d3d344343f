use std::path::{Path, PathBuf};
use std::time::Duration;

use mirrorwatch_core::config;

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);
pub const DAEMON_SOCKET: &str = "daemon.sock";

/// `<home>/.mirrorwatch`
pub fn mirrorwatch_root(home: &Path) -> PathBuf {
    config::root_at(home)
}

pub fn socket_path(home: &Path) -> PathBuf {
    mirrorwatch_root(home).join(DAEMON_SOCKET)
}

pub fn config_path(home: &Path) -> PathBuf {
    config::default_config_path_at(home)
}
