//! # Store Error Types
//!
//! [`StoreError::is_recoverable`] separates the one expected failure, a
//! pending object that has not arrived, from inconsistencies that must
//! stop the process.

use std::path::PathBuf;

use thiserror::Error;

use crate::layout::Stage;

/// Errors from the object store state machine.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The object to promote is not in its source stage.
    #[error("{stage} object {} not found", path.display())]
    SourceMissing { stage: Stage, path: PathBuf },

    /// A digest or file name would escape its stage directory.
    #[error("invalid {what} {name:?}: must be a single path component")]
    InvalidName { what: &'static str, name: String },

    /// The destination already holds an object of the same name.
    #[error("{stage} object {} already exists", path.display())]
    AlreadyPresent { stage: Stage, path: PathBuf },

    /// A filesystem operation failed.
    #[error("{op} {} failed: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// A missing pending source may be retried by re-delivery; an invalid
    /// name is fixed by a corrected config.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SourceMissing {
                stage: Stage::Pending,
                ..
            } | Self::InvalidName { .. }
        )
    }

    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { op, path, source }
    }
}

/// Errors reading or writing Status records.
#[derive(Error, Debug)]
pub enum StatusError {
    #[error("unable to read status {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to decode status {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to encode status {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to write status {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to remove status {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to list status directory {}: {source}", path.display())]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
