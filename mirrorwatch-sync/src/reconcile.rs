//! File reconciler: compare one local/reference pair and optionally replace
//! the local copy.
//!
//! ## `replace_file` protocol
//!
//! 0. Resolve the local path through any symlinks; the resolved file is the
//!    target and the link itself is left alone.
//! 1. Stream the reference bytes into `<target>.mirrorwatch.tmp`.
//! 2. Carry over the target's permissions.
//! 3. `fsync` the temporary file.
//! 4. Rename over the target (atomic on POSIX).
//! 5. `fsync` the target's parent directory.
//!
//! Any failure before step 4 removes the temporary file and leaves the local
//! file as it was.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use mirrorwatch_core::types::FilePair;

use crate::error::{io_err, SyncError};
use crate::fingerprint::fingerprint_file;
use crate::version::VersionExtractor;

/// Outcome of reconciling one file pair.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileResult {
    /// Local and reference bytes differed when compared.
    pub changed: bool,
    /// Empty unless the pair tracks a version.
    pub local_version: String,
    /// Empty unless the pair tracks a version.
    pub reference_version: String,
}

/// Compare `pair` and, when `apply_enabled`, copy the reference over the
/// local file.
///
/// A fingerprint failure at either path aborts this pair only; the caller
/// decides how to report it. Versions are read after any write.
pub fn reconcile(
    pair: &FilePair,
    apply_enabled: bool,
    extractor: &VersionExtractor,
) -> Result<ReconcileResult, SyncError> {
    let local = fingerprint_file(&pair.local_path)?;
    let reference = fingerprint_file(&pair.reference_path)?;
    tracing::debug!(
        "fingerprints {}: local={} reference={}",
        pair.local_path.display(),
        local,
        reference
    );

    let changed = if local == reference {
        tracing::debug!("unchanged: {}", pair.local_path.display());
        false
    } else if apply_enabled {
        replace_file(&pair.reference_path, &pair.local_path)?;
        tracing::info!(
            "replaced {} from {}",
            pair.local_path.display(),
            pair.reference_path.display()
        );
        true
    } else {
        tracing::info!("[observe] drift: {}", pair.local_path.display());
        true
    };

    let (local_version, reference_version) = read_versions(pair, extractor);
    Ok(ReconcileResult {
        changed,
        local_version,
        reference_version,
    })
}

/// Versions of both sides of `pair`; empty strings when it tracks none.
pub fn read_versions(pair: &FilePair, extractor: &VersionExtractor) -> (String, String) {
    if !pair.tracks_version {
        return (String::new(), String::new());
    }
    (
        extractor.extract_file(&pair.local_path),
        extractor.extract_file(&pair.reference_path),
    )
}

// ---------------------------------------------------------------------------
// replace_file
// ---------------------------------------------------------------------------

/// Replace `target` with a byte-for-byte copy of `source`. A symlinked
/// `target` is written through.
pub fn replace_file(source: &Path, target: &Path) -> Result<(), SyncError> {
    let target = resolve_target(target)?;
    replace_file_with_tmp(source, &target, &tmp_path_for(&target))
}

/// The file a write to `path` should land in.
fn resolve_target(path: &Path) -> Result<PathBuf, SyncError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let resolved = fs::canonicalize(path).map_err(|e| io_err(path, e))?;
            tracing::debug!(
                "writing through symlink {} -> {}",
                path.display(),
                resolved.display()
            );
            Ok(resolved)
        }
        _ => Ok(path.to_path_buf()),
    }
}

pub(crate) fn tmp_path_for(target: &Path) -> PathBuf {
    PathBuf::from(format!("{}.mirrorwatch.tmp", target.display()))
}

fn replace_file_with_tmp(source: &Path, target: &Path, tmp: &Path) -> Result<(), SyncError> {
    let mut reader = File::open(source).map_err(|e| io_err(source, e))?;

    if let Err(err) = write_tmp(&mut reader, target, tmp) {
        let _ = fs::remove_file(tmp);
        return Err(err);
    }

    if let Err(e) = fs::rename(tmp, target) {
        let _ = fs::remove_file(tmp);
        return Err(io_err(target, e));
    }

    sync_parent_dir(target);
    Ok(())
}

fn write_tmp(reader: &mut File, target: &Path, tmp: &Path) -> Result<(), SyncError> {
    let mut file = File::create(tmp).map_err(|e| io_err(tmp, e))?;
    io::copy(reader, &mut file).map_err(|e| io_err(tmp, e))?;

    // Deployed files keep their mode across replacement.
    if let Ok(meta) = fs::metadata(target) {
        fs::set_permissions(tmp, meta.permissions()).map_err(|e| io_err(tmp, e))?;
    }

    file.sync_all().map_err(|e| io_err(tmp, e))
}

#[cfg(unix)]
fn sync_parent_dir(target: &Path) {
    let Some(parent) = target.parent() else {
        return;
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    if let Err(err) = File::open(parent).and_then(|dir| dir.sync_all()) {
        tracing::debug!("directory fsync skipped for {}: {}", parent.display(), err);
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_target: &Path) {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
