//! Permission-aware filesystem helpers.
//!
//! Locked directories are mode 0500, which denies entry removal to a
//! non-root owner. Every removal or rename out of such a directory goes
//! through these helpers, which restore owner write access first.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;

use crate::error::StoreError;

pub(crate) const DIR_MODE: u32 = 0o700;
pub(crate) const LOCKED_DIR_MODE: u32 = 0o500;
pub(crate) const LOCKED_FILE_MODE: u32 = 0o400;

/// Create `path` and any missing parents with mode 0700.
pub(crate) fn create_dir_all(path: &Path) -> Result<(), StoreError> {
    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(path)
        .map_err(StoreError::io("mkdir", path))
}

pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<(), StoreError> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(StoreError::io("chmod", path))
}

/// Restore owner write access on a directory, if it exists.
pub(crate) fn unlock_dir(path: &Path) -> Result<(), StoreError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            let mode = meta.permissions().mode() & 0o7777;
            if mode & DIR_MODE != DIR_MODE {
                set_mode(path, mode | DIR_MODE)?;
            }
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io("stat", path)(e)),
    }
}

/// Remove a directory tree, unlocking every directory in it first.
///
/// Returns `false` when there was nothing to remove.
pub(crate) fn remove_tree(path: &Path) -> Result<bool, StoreError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            unlock_recursive(path)?;
            fs::remove_dir_all(path).map_err(StoreError::io("remove", path))?;
            Ok(true)
        }
        Ok(_) => {
            fs::remove_file(path).map_err(StoreError::io("remove", path))?;
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io("stat", path)(e)),
    }
}

fn unlock_recursive(dir: &Path) -> Result<(), StoreError> {
    unlock_dir(dir)?;
    for entry in fs::read_dir(dir).map_err(StoreError::io("readdir", dir))? {
        let entry = entry.map_err(StoreError::io("readdir", dir))?;
        let file_type = entry.file_type().map_err(StoreError::io("stat", entry.path()))?;
        if file_type.is_dir() {
            unlock_recursive(&entry.path())?;
        }
    }
    Ok(())
}

pub(crate) fn rename(from: &Path, to: &Path) -> Result<(), StoreError> {
    fs::rename(from, to).map_err(StoreError::io("rename", from))
}
