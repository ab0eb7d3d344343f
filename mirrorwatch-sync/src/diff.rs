//! Unified diffs of local files against their reference copies.
//!
//! Shows what an applying cycle would write. Nothing is modified.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use mirrorwatch_core::types::{GroupName, ServiceGroup};

use crate::{error::io_err, fingerprint::fingerprint_file, SyncError};

/// A single drifted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: PathBuf,
    pub unified_diff: String,
}

/// Diff result for a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDiff {
    pub group_name: GroupName,
    pub diffs: Vec<FileDiff>,
}

/// Compare every pair of `group` and render a diff for each that differs.
///
/// A missing local file diffs as empty; a missing reference is an error.
pub fn diff_group(group: &ServiceGroup) -> Result<GroupDiff, SyncError> {
    let mut diffs = Vec::new();
    for pair in &group.files {
        let reference = read_lossy(&pair.reference_path)?;
        let existing = match read_lossy(&pair.local_path) {
            Ok(content) => Some(content),
            Err(SyncError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(err),
        };
        if let Some(existing) = existing.as_deref() {
            if existing == reference && same_bytes(&pair.local_path, &pair.reference_path)? {
                continue;
            }
        }
        let existing = existing.unwrap_or_default();

        let old_header = pair.local_path.display().to_string();
        let new_header = pair.reference_path.display().to_string();
        let unified = TextDiff::from_lines(&existing, &reference)
            .unified_diff()
            .header(&old_header, &new_header)
            .context_radius(3)
            .to_string();

        diffs.push(FileDiff {
            path: pair.local_path.clone(),
            unified_diff: unified,
        });
    }

    Ok(GroupDiff {
        group_name: group.name.clone(),
        diffs,
    })
}

fn read_lossy(path: &Path) -> Result<String, SyncError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Lossy decoding can map distinct invalid sequences to the same text.
fn same_bytes(local: &Path, reference: &Path) -> Result<bool, SyncError> {
    Ok(fingerprint_file(local)? == fingerprint_file(reference)?)
}
