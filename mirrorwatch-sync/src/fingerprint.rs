//! Content fingerprints: SHA-256 over a file's exact bytes.
//!
//! Used for equality testing only. No line-ending or whitespace
//! normalisation: two files are identical iff every byte matches.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{io_err, SyncError};

/// Fixed-length digest of a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self::from_hasher(Sha256::new_with_prefix(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn from_hasher(hasher: Sha256) -> Self {
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Stream `reader` through SHA-256.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> io::Result<Fingerprint> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(Fingerprint::from_hasher(hasher))
}

/// Fingerprint the file at `path`. Open or read failures carry the path.
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint, SyncError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    fingerprint_reader(file).map_err(|e| io_err(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn known_digest() {
        assert_eq!(
            Fingerprint::of_bytes(b"hello world").to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn file_and_bytes_agree() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, b"payload").unwrap();
        assert_eq!(
            fingerprint_file(&path).unwrap(),
            Fingerprint::of_bytes(b"payload")
        );
    }

    #[test]
    fn line_endings_are_significant() {
        assert_ne!(
            Fingerprint::of_bytes(b"line1\r\nline2\r\n"),
            Fingerprint::of_bytes(b"line1\nline2\n")
        );
    }

    #[test]
    fn trailing_whitespace_is_significant() {
        assert_ne!(Fingerprint::of_bytes(b"x"), Fingerprint::of_bytes(b"x "));
    }

    #[test]
    fn missing_file_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.py");
        let err = fingerprint_file(&path).unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }));
        assert!(err.to_string().contains("absent.py"));
    }
}
