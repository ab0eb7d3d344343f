pub mod check;
pub mod daemon;
pub mod diff;
pub mod status;
pub mod sync;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use mirrorwatch_core::{config, Config};
use mirrorwatch_daemon::HttpRestartNotifier;
use mirrorwatch_sync::SyncEngine;

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalOpts {
    pub home: PathBuf,
    pub config_path: PathBuf,
    pub log_json: bool,
}

impl GlobalOpts {
    pub fn resolve(config_path: Option<PathBuf>, log_json: bool) -> Result<Self> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let config_path = config_path.unwrap_or_else(|| config::default_config_path_at(&home));
        Ok(Self {
            home,
            config_path,
            log_json,
        })
    }

    pub fn load_config(&self) -> Result<Config> {
        config::load_at(&self.config_path).with_context(|| {
            format!(
                "failed to load configuration from {}",
                self.config_path.display()
            )
        })
    }
}

/// Engine wired to the HTTP notifier with the configured timeout.
pub fn http_engine(config: &Config) -> SyncEngine<HttpRestartNotifier> {
    let notifier = HttpRestartNotifier::new(Duration::from_secs(config.notify_timeout_secs));
    SyncEngine::from_config(config, notifier)
}
