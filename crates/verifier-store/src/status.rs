//! # Status Record Store
//!
//! One JSON file per object at `<status_root>/<class>/status/<key>.json`.
//! Writes are plain overwrites; the reconciler is the only writer.
//!
//! Each class directory also holds a `restarted` marker. It is removed
//! before crash recovery and written once recovery has finished, so a
//! consumer that sees it knows the Status set is complete.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use verifier_core::{ObjectClass, VerifyStatus};

use crate::error::{StatusError, StoreError};
use crate::fsops;

const STATUS_DIR: &str = "status";
const EXTENSION: &str = "json";
const RESTARTED_MARKER: &str = "restarted";

#[derive(Debug, Clone)]
pub struct StatusStore {
    root: PathBuf,
}

impl StatusStore {
    pub fn new(status_root: impl Into<PathBuf>) -> Self {
        Self {
            root: status_root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The status directory of a class.
    pub fn dir(&self, class: ObjectClass) -> PathBuf {
        self.root.join(class.as_str()).join(STATUS_DIR)
    }

    /// The status file for `key` (usually a safename).
    pub fn path_for(&self, class: ObjectClass, key: &str) -> PathBuf {
        self.dir(class).join(format!("{key}.{EXTENSION}"))
    }

    /// Create the status directory of every class.
    pub fn prepare(&self) -> Result<(), StoreError> {
        for class in ObjectClass::ALL {
            fsops::create_dir_all(&self.dir(class))?;
        }
        Ok(())
    }

    /// Load a status record; `Ok(None)` when the file does not exist.
    pub fn read(&self, path: &Path) -> Result<Option<VerifyStatus>, StatusError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StatusError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StatusError::Decode {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn write(&self, path: &Path, status: &VerifyStatus) -> Result<(), StatusError> {
        let bytes = serde_json::to_vec_pretty(status).map_err(|source| StatusError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, bytes).map_err(|source| StatusError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Remove a status file. Returns `false` if it was already gone.
    pub fn remove(&self, path: &Path) -> Result<bool, StatusError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StatusError::Remove {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn restarted_marker(&self, class: ObjectClass) -> PathBuf {
        self.dir(class).join(RESTARTED_MARKER)
    }

    /// Withdraw the restart signal of a class. Returns `false` if it was
    /// not set.
    pub fn clear_restarted(&self, class: ObjectClass) -> Result<bool, StatusError> {
        self.remove(&self.restarted_marker(class))
    }

    /// Tell consumers that recovery has rebuilt the Status set of a class.
    pub fn signal_restarted(&self, class: ObjectClass) -> Result<(), StatusError> {
        let path = self.restarted_marker(class);
        fs::write(&path, b"").map_err(|source| StatusError::Write { path, source })
    }

    pub fn is_restarted(&self, class: ObjectClass) -> bool {
        self.restarted_marker(class).is_file()
    }

    /// Every `*.json` file in a class status directory, sorted.
    pub fn list(&self, class: ObjectClass) -> Result<Vec<PathBuf>, StatusError> {
        let dir = self.dir(class);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StatusError::List { path: dir, source }),
        };
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StatusError::List {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}
