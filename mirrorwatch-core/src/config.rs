//! Configuration loading and validation.
//!
//! # Storage layout
//!
//! ```text
//! ~/.mirrorwatch/
//!   config.yaml     (group definitions, gate initial value, credentials)
//! ```
//!
//! # API pattern
//!
//! Path-taking functions (`load_at`, `default_config_path_at`) are used by
//! tests with `TempDir`; the no-arg wrappers derive home from
//! `dirs::home_dir()`.
//!
//! The loader is the only writer of [`Config`]; the engine never persists it
//! back.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{
    Config, Credentials, ServiceGroup, VersionRule, DEFAULT_INTERVAL_SECS,
    DEFAULT_NOTIFY_TIMEOUT_SECS,
};

pub const CONFIG_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.mirrorwatch/`
pub fn root_at(home: &Path) -> PathBuf {
    home.join(".mirrorwatch")
}

/// `<home>/.mirrorwatch/config.yaml`, pure, no I/O.
pub fn default_config_path_at(home: &Path) -> PathBuf {
    root_at(home).join(CONFIG_FILE)
}

/// `default_config_path_at` convenience wrapper.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(default_config_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// On-disk document. Accepts both the nested `credentials` block and the
/// flat `username`/`password` keys of older files; unknown keys are ignored.
#[derive(Debug, Deserialize)]
struct ConfigDocument {
    #[serde(default, alias = "status")]
    apply_enabled: bool,
    interval_secs: Option<u64>,
    notify_timeout_secs: Option<u64>,
    #[serde(default)]
    watch_reference: bool,
    reference_root: Option<PathBuf>,
    credentials: Option<Credentials>,
    username: Option<String>,
    password: Option<String>,
    #[serde(default)]
    version: VersionRule,
    #[serde(default, alias = "update_infos")]
    groups: Vec<ServiceGroup>,
}

impl ConfigDocument {
    fn into_config(self) -> Config {
        let credentials = self.credentials.unwrap_or_else(|| {
            Credentials::new(
                self.username.unwrap_or_default(),
                self.password.unwrap_or_default(),
            )
        });
        Config {
            apply_enabled: self.apply_enabled,
            interval_secs: self.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS),
            notify_timeout_secs: self
                .notify_timeout_secs
                .unwrap_or(DEFAULT_NOTIFY_TIMEOUT_SECS),
            watch_reference: self.watch_reference,
            reference_root: self.reference_root,
            credentials,
            version: self.version,
            groups: self.groups,
        }
    }
}

/// Load, resolve, and validate the configuration at `path`.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with path
/// + line context) if malformed YAML, `ConfigError::Invalid` if the document
/// fails validation.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_yaml_str(&contents, path)
}

/// `load_at(default_config_path())` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&default_config_path()?)
}

/// Parse, resolve, and validate YAML text; `path` is used for error context.
pub fn from_yaml_str(contents: &str, path: &Path) -> Result<Config, ConfigError> {
    let document: ConfigDocument =
        serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let mut config = document.into_config();
    resolve_reference_paths(&mut config);
    validate(&config)?;
    Ok(config)
}

/// Join relative `reference_path` entries onto `reference_root`.
fn resolve_reference_paths(config: &mut Config) {
    let Some(root) = config.reference_root.clone() else {
        return;
    };
    for pair in config.groups.iter_mut().flat_map(|g| g.files.iter_mut()) {
        if pair.reference_path.is_relative() {
            pair.reference_path = root.join(&pair.reference_path);
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Validate
// ---------------------------------------------------------------------------

/// Reject configurations the engine cannot run.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.groups.is_empty() {
        return Err(invalid("no groups defined"));
    }
    if config.interval_secs == 0 {
        return Err(invalid("interval_secs must be greater than zero"));
    }
    if config.notify_timeout_secs == 0 {
        return Err(invalid("notify_timeout_secs must be greater than zero"));
    }
    if config.version.line == 0 {
        return Err(invalid("version.line is 1-based and must be at least 1"));
    }
    if config.version.prefix.is_empty() {
        return Err(invalid("version.prefix must not be empty"));
    }

    let mut seen = HashSet::new();
    for group in &config.groups {
        if group.name.0.trim().is_empty() {
            return Err(invalid("group name must not be empty"));
        }
        if !seen.insert(group.name.clone()) {
            return Err(invalid(format!("duplicate group name '{}'", group.name)));
        }
        if !(group.restart_target.starts_with("http://")
            || group.restart_target.starts_with("https://"))
        {
            return Err(invalid(format!(
                "group '{}': restart_target must be an http(s) URL, got '{}'",
                group.name, group.restart_target
            )));
        }
        if group.files.is_empty() {
            return Err(invalid(format!("group '{}' has no files", group.name)));
        }
        for pair in &group.files {
            if pair.local_path.as_os_str().is_empty() || pair.reference_path.as_os_str().is_empty()
            {
                return Err(invalid(format!(
                    "group '{}' has a file entry with an empty path",
                    group.name
                )));
            }
        }
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

// ---------------------------------------------------------------------------
// 4. Home directory
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
