//! Domain types for mirrorwatch configuration and per-cycle group state.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! All types are serializable/deserializable via serde + serde_yaml. Field
//! aliases accept the key names used by older deployments.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a service group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupName(pub String);

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for GroupName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GroupName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Credentials and version rule
// ---------------------------------------------------------------------------

/// Credentials presented to a restart target.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

pub const DEFAULT_VERSION_LINE: usize = 69;
pub const DEFAULT_VERSION_PREFIX: &str = "return \"v";

/// Where a version token lives inside a version-tracked file.
///
/// `line` is 1-based. The token is the text between the first and last `"`
/// of that line, provided the line contains `prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRule {
    #[serde(default = "default_version_line")]
    pub line: usize,
    #[serde(default = "default_version_prefix")]
    pub prefix: String,
}

impl Default for VersionRule {
    fn default() -> Self {
        Self {
            line: DEFAULT_VERSION_LINE,
            prefix: DEFAULT_VERSION_PREFIX.to_string(),
        }
    }
}

fn default_version_line() -> usize {
    DEFAULT_VERSION_LINE
}

fn default_version_prefix() -> String {
    DEFAULT_VERSION_PREFIX.to_string()
}

// ---------------------------------------------------------------------------
// File pairs and service groups
// ---------------------------------------------------------------------------

/// One deployed file and the reference copy it should match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePair {
    #[serde(alias = "file_path")]
    pub local_path: PathBuf,
    #[serde(alias = "github_file_path")]
    pub reference_path: PathBuf,
    #[serde(default, alias = "has_version")]
    pub tracks_version: bool,
    /// Outcome of the most recent comparison: `true` when drift was seen.
    #[serde(default, alias = "update")]
    pub updated: bool,
}

impl FilePair {
    pub fn new(local_path: impl Into<PathBuf>, reference_path: impl Into<PathBuf>) -> Self {
        Self {
            local_path: local_path.into(),
            reference_path: reference_path.into(),
            tracks_version: false,
            updated: false,
        }
    }

    pub fn tracking_version(mut self) -> Self {
        self.tracks_version = true;
        self
    }
}

/// A named set of file pairs sharing one restart target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGroup {
    pub name: GroupName,
    /// Base URL of the service to reload when any file in the group changes.
    #[serde(alias = "restart_api")]
    pub restart_target: String,
    #[serde(default)]
    pub files: Vec<FilePair>,
    /// Last observed local version among version-tracked files. Advisory.
    #[serde(default)]
    pub version: String,
    /// Last observed reference version among version-tracked files. Advisory.
    #[serde(default)]
    pub reference_version: String,
    /// Files were applied but the service never confirmed a reload. Cleared
    /// by the next confirmed restart; not persisted.
    #[serde(skip)]
    pub restart_pending: bool,
}

impl ServiceGroup {
    pub fn new(name: impl Into<GroupName>, restart_target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            restart_target: restart_target.into(),
            files: Vec::new(),
            version: String::new(),
            reference_version: String::new(),
            restart_pending: false,
        }
    }

    pub fn with_file(mut self, pair: FilePair) -> Self {
        self.files.push(pair);
        self
    }

    /// Local paths whose last comparison reported drift, in configured order.
    pub fn updated_paths(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|pair| pair.updated)
            .map(|pair| pair.local_path.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Root configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_INTERVAL_SECS: u64 = 15 * 60;
pub const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;

/// Root of the mirrorwatch YAML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Initial value of the apply gate.
    #[serde(default)]
    pub apply_enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,
    /// Trigger a cycle when a reference file changes on disk.
    #[serde(default)]
    pub watch_reference: bool,
    /// Relative `reference_path` entries are resolved against this directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_root: Option<PathBuf>,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub version: VersionRule,
    #[serde(default)]
    pub groups: Vec<ServiceGroup>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apply_enabled: false,
            interval_secs: DEFAULT_INTERVAL_SECS,
            notify_timeout_secs: DEFAULT_NOTIFY_TIMEOUT_SECS,
            watch_reference: false,
            reference_root: None,
            credentials: Credentials::default(),
            version: VersionRule::default(),
            groups: Vec::new(),
        }
    }
}

impl Config {
    pub fn find_group(&self, name: &GroupName) -> Option<&ServiceGroup> {
        self.groups.iter().find(|group| &group.name == name)
    }
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_notify_timeout_secs() -> u64 {
    DEFAULT_NOTIFY_TIMEOUT_SECS
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
