//! Seed installer
//!
//! Copies a pre-built store file into place exactly once. The copy is
//! written to a temporary file in the target directory and then linked
//! into place, so readers never observe a partial store and an existing
//! store is never overwritten.

#![allow(clippy::result_large_err)]

use crate::bundle::ResourceBundle;
use crate::errors::Result;
use crate::paths::store_file_name;
use grove_core::errors::{ExError, ExErrorKind};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// The seed was copied; `bytes` is the size of the installed store
    Installed { bytes: u64 },
    /// A store file already existed and was left alone
    StoreAlreadyPresent,
}

fn seed_copy_error(op: &str, path: &Path, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::SeedCopy)
        .with_op(op)
        .with_message(format!("{}: {}", path.display(), err))
}

fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    target.with_file_name(format!(".{}.{}.seed", name, uuid::Uuid::new_v4().simple()))
}

/// Install `source` at `target` unless a store already exists there
///
/// # Errors
/// - `SeedSourceMissing` if `source` is not a file
/// - `SeedCopy` if copying or linking fails
pub fn install_seed(source: &Path, target: &Path) -> Result<SeedOutcome> {
    if target.exists() {
        return Ok(SeedOutcome::StoreAlreadyPresent);
    }
    if !source.is_file() {
        return Err(ExError::new(ExErrorKind::SeedSourceMissing)
            .with_op("install_seed")
            .with_message(format!("Seed file {} does not exist", source.display())));
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| seed_copy_error("create_store_dir", parent, e))?;
    }

    let temp = temp_path_for(target);
    let bytes = fs::copy(source, &temp).map_err(|e| {
        let _ = fs::remove_file(&temp);
        seed_copy_error("copy_seed", source, e)
    })?;

    let placed = link_into_place(&temp, target);
    let _ = fs::remove_file(&temp);
    if !placed? {
        return Ok(SeedOutcome::StoreAlreadyPresent);
    }

    tracing::debug!(
        source = %source.display(),
        target = %target.display(),
        bytes,
        "seed installed"
    );
    Ok(SeedOutcome::Installed { bytes })
}

/// Publish `temp` as `target` without replacing an existing file.
///
/// Returns false when another writer got there first.
fn link_into_place(temp: &Path, target: &Path) -> Result<bool> {
    match fs::hard_link(temp, target) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(_) => {
            // Filesystems without hard links: re-check, then rename.
            if target.exists() {
                return Ok(false);
            }
            fs::rename(temp, target).map_err(|e| seed_copy_error("rename_seed", target, e))?;
            Ok(true)
        }
    }
}

/// Install `<model>.sqlite` from `bundle` at `target`
///
/// # Errors
/// `SeedNotFoundInBundle` if the bundle lacks the resource, otherwise as
/// [`install_seed`].
pub fn install_from_bundle(
    bundle: &dyn ResourceBundle,
    model: &str,
    target: &Path,
) -> Result<SeedOutcome> {
    let name = store_file_name(model);
    let source = bundle.resource_path(&name).ok_or_else(|| {
        ExError::new(ExErrorKind::SeedNotFoundInBundle)
            .with_op("install_seed_from_bundle")
            .with_message(format!("Bundle has no resource '{}'", name))
    })?;
    install_seed(&source, target)
}
