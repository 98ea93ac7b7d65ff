//! Secure deletion of session artifacts
//!
//! Deletion only touches paths whose canonical form sits under one of the
//! configured temp prefixes. Symlinks and `..` components are refused
//! before canonicalization ever happens.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::{Error, Result};

/// Overwrite at most this much of a file before unlinking
const OVERWRITE_CAP: u64 = 1024 * 1024;

/// Whitelisted secure file deletion and session sweep.
pub struct SecureCleaner {
    allowed_prefixes: Vec<PathBuf>,
}

impl SecureCleaner {
    /// Build a cleaner restricted to the given prefixes. Prefixes that do
    /// not exist yet are kept; they are compared canonically when possible.
    pub fn new(allowed_prefixes: Vec<PathBuf>) -> Self {
        Self { allowed_prefixes }
    }

    /// Delete a file, optionally overwriting its head first.
    ///
    /// Refuses anything outside the allowed prefixes, any path containing
    /// `..`, and any symlink. A missing file counts as success.
    pub fn delete(&self, path: impl AsRef<Path>, overwrite: bool) -> Result<bool> {
        let path = path.as_ref();

        self.check_path(path)?;

        let metadata = match std::fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        if metadata.file_type().is_symlink() {
            return Err(Error::Config(format!(
                "refusing to delete symlink: {}",
                path.display()
            )));
        }
        if !metadata.is_file() {
            return Err(Error::Config(format!(
                "refusing to delete non-file: {}",
                path.display()
            )));
        }

        if overwrite {
            if let Err(e) = overwrite_head(path, metadata.len()) {
                // Overwrite is best-effort; deletion still proceeds
                warn!("overwrite before delete failed: {}", e);
            }
        }

        std::fs::remove_file(path)?;
        debug!("deleted {}", path.display());
        Ok(true)
    }

    /// Remove session directories older than `max_age` under the allowed
    /// prefixes. Returns the number of directories removed.
    pub fn cleanup_old_sessions(&self, max_age: Duration) -> Result<u64> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0u64;

        for prefix in &self.allowed_prefixes {
            let Ok(entries) = std::fs::read_dir(prefix) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let Ok(metadata) = entry.metadata() else {
                    continue;
                };
                if !metadata.is_dir() {
                    continue;
                }
                let Ok(modified) = metadata.modified() else {
                    continue;
                };
                if modified < cutoff && std::fs::remove_dir_all(&path).is_ok() {
                    removed += 1;
                    debug!("swept old session dir {}", path.display());
                }
            }
        }

        Ok(removed)
    }

    fn check_path(&self, path: &Path) -> Result<()> {
        if path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(Error::Config(format!(
                "path traversal refused: {}",
                path.display()
            )));
        }

        // Canonicalize the parent (the file itself may be a symlink we want
        // to catch separately)
        let parent = path.parent().unwrap_or(path);
        let canonical_parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
        let file_name = path.file_name().unwrap_or_default();
        let canonical = canonical_parent.join(file_name);

        let allowed = self.allowed_prefixes.iter().any(|prefix| {
            let canonical_prefix = prefix
                .canonicalize()
                .unwrap_or_else(|_| prefix.clone());
            canonical.starts_with(&canonical_prefix)
        });

        if !allowed {
            return Err(Error::Config(format!(
                "path outside allowed temp prefixes: {}",
                path.display()
            )));
        }
        Ok(())
    }
}

fn overwrite_head(path: &Path, len: u64) -> std::io::Result<()> {
    use std::io::{Seek, SeekFrom, Write};

    let write_len = len.min(OVERWRITE_CAP) as usize;
    if write_len == 0 {
        return Ok(());
    }
    let mut file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&vec![0u8; write_len])?;
    file.flush()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cleaner_for(temp: &TempDir) -> SecureCleaner {
        SecureCleaner::new(vec![temp.path().to_path_buf()])
    }

    #[test]
    fn test_delete_inside_prefix() {
        let temp = TempDir::new().expect("should create temp dir");
        let file = temp.path().join("stdout.log");
        std::fs::write(&file, "raw output").expect("should write");

        let cleaner = cleaner_for(&temp);
        assert!(cleaner.delete(&file, true).expect("should delete"));
        assert!(!file.exists());
    }

    #[test]
    fn test_delete_outside_prefix_refused() {
        let temp = TempDir::new().expect("should create temp dir");
        let other = TempDir::new().expect("should create other dir");
        let file = other.path().join("precious.txt");
        std::fs::write(&file, "keep me").expect("should write");

        let cleaner = cleaner_for(&temp);
        let err = cleaner.delete(&file, false).unwrap_err();
        assert!(err.to_string().contains("outside allowed"));
        assert!(file.exists());
    }

    #[test]
    fn test_parent_dir_component_refused() {
        let temp = TempDir::new().expect("should create temp dir");
        let cleaner = cleaner_for(&temp);
        let sneaky = temp.path().join("session").join("..").join("..").join("etc-passwd");
        let err = cleaner.delete(&sneaky, false).unwrap_err();
        assert!(err.to_string().contains("traversal"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_refused() {
        let temp = TempDir::new().expect("should create temp dir");
        let outside = TempDir::new().expect("should create outside dir");
        let target = outside.path().join("target.txt");
        std::fs::write(&target, "data").expect("should write");
        let link = temp.path().join("link.txt");
        std::os::unix::fs::symlink(&target, &link).expect("should symlink");

        let cleaner = cleaner_for(&temp);
        let err = cleaner.delete(&link, false).unwrap_err();
        assert!(err.to_string().contains("symlink"));
        assert!(target.exists());
    }

    #[test]
    fn test_missing_file_is_success() {
        let temp = TempDir::new().expect("should create temp dir");
        let cleaner = cleaner_for(&temp);
        assert!(cleaner
            .delete(temp.path().join("never-existed.log"), false)
            .expect("should succeed"));
    }

    #[test]
    fn test_cleanup_old_sessions() {
        let temp = TempDir::new().expect("should create temp dir");
        let old_dir = temp.path().join("11111111-old-session");
        std::fs::create_dir(&old_dir).expect("should create");
        std::fs::write(old_dir.join("stdout.log"), "x").expect("should write");

        let cleaner = cleaner_for(&temp);
        // Zero max age: everything qualifies
        let removed = cleaner
            .cleanup_old_sessions(Duration::from_secs(0))
            .expect("should sweep");
        assert_eq!(removed, 1);
        assert!(!old_dir.exists());
    }
}
