//! File protection for stores opened with encryption requested
//!
//! The object graph itself is stored in plain SQLite; protection is applied
//! to the file (and its journal companions) by a platform collaborator.

use crate::errors::{io_error, Result};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

pub trait FileProtection: Send + Sync + Debug {
    /// Protect the store file at `path`
    fn protect(&self, path: &Path) -> Result<()>;
}

/// Leaves files untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProtection;

impl FileProtection for NoProtection {
    fn protect(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Restricts the store file to its owner (mode 0600 on unix)
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissionsProtection;

/// The store file plus the WAL companions that exist next to it
fn protected_files(path: &Path) -> Vec<PathBuf> {
    let mut files = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        let companion = PathBuf::from(name);
        if companion.exists() {
            files.push(companion);
        }
    }
    files
}

impl FileProtection for PermissionsProtection {
    #[cfg(unix)]
    fn protect(&self, path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        for file in protected_files(path) {
            std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| io_error("protect_store", e))?;
        }
        tracing::debug!(path = %path.display(), "store file protected");
        Ok(())
    }

    #[cfg(not(unix))]
    fn protect(&self, path: &Path) -> Result<()> {
        for file in protected_files(path) {
            let mut permissions = std::fs::metadata(&file)
                .map_err(|e| io_error("protect_store", e))?
                .permissions();
            permissions.set_readonly(false);
            std::fs::set_permissions(&file, permissions)
                .map_err(|e| io_error("protect_store", e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_permissions_protection_sets_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Catalog.sqlite");
        std::fs::write(&path, b"").unwrap();
        std::fs::write(dir.path().join("Catalog.sqlite-wal"), b"").unwrap();

        PermissionsProtection.protect(&path).unwrap();

        for file in [path.clone(), dir.path().join("Catalog.sqlite-wal")] {
            let mode = std::fs::metadata(&file).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{}", file.display());
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PermissionsProtection
            .protect(&dir.path().join("absent.sqlite"))
            .unwrap_err();
        assert_eq!(err.kind(), grove_core::ExErrorKind::Io);
    }
}
