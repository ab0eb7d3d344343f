//! Version token extraction.
//!
//! Deployed files carry their version on one fixed line, as a quoted string
//! following a literal prefix (by default line 69, `return "v`). Extraction
//! reads that one line, requires the prefix, and returns
//! the text between the first and last `"` on it. Anything else yields an
//! empty string.

use std::path::Path;

use mirrorwatch_core::types::{VersionRule, DEFAULT_VERSION_LINE, DEFAULT_VERSION_PREFIX};

/// Extracts version tokens at a configured line and prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionExtractor {
    /// 1-based line number.
    line: usize,
    prefix: String,
}

impl VersionExtractor {
    pub fn new(line: usize, prefix: impl Into<String>) -> Self {
        Self {
            line,
            prefix: prefix.into(),
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Return the version token in `content`, or an empty string.
    pub fn extract(&self, content: &str) -> String {
        let Some(index) = self.line.checked_sub(1) else {
            return String::new();
        };
        let Some(line) = content.lines().nth(index) else {
            return String::new();
        };
        if !line.contains(self.prefix.as_str()) {
            return String::new();
        }
        match (line.find('"'), line.rfind('"')) {
            (Some(start), Some(end)) if start < end => line[start + 1..end].to_string(),
            _ => String::new(),
        }
    }

    /// Read `path` and extract its version token.
    ///
    /// Unreadable files yield an empty string; the failure is logged, not
    /// returned.
    pub fn extract_file(&self, path: &Path) -> String {
        match std::fs::read(path) {
            Ok(bytes) => self.extract(&String::from_utf8_lossy(&bytes)),
            Err(err) => {
                tracing::warn!("cannot read {} for version: {}", path.display(), err);
                String::new()
            }
        }
    }
}

impl Default for VersionExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_VERSION_LINE, DEFAULT_VERSION_PREFIX)
    }
}

impl From<&VersionRule> for VersionExtractor {
    fn from(rule: &VersionRule) -> Self {
        Self::new(rule.line, rule.prefix.clone())
    }
}
