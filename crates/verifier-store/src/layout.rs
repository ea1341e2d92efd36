//! # Object Store Layout
//!
//! Path arithmetic for the three stage trees of each object class:
//!
//! ```text
//! <object_root>/<class>/pending/<digest>/<safename>
//! <object_root>/<class>/verifying/<digest>/<safename>
//! <object_root>/<class>/verified/<digest>/<final_name>
//! ```
//!
//! No filesystem access happens here. Digests and names come from
//! configs, so callers check them with [`ensure_component`] before joining.

use std::path::{Path, PathBuf};

use verifier_core::ObjectClass;

use crate::error::StoreError;

/// Require `name` to be one path component that stays inside its parent:
/// non-empty, not `.` or `..`, and free of `/` and NUL.
pub fn ensure_component(what: &'static str, name: &str) -> Result<(), StoreError> {
    let escapes = name.is_empty() || name == "." || name == ".." || name.contains(|c: char| c == '/' || c == '\0');
    if escapes {
        return Err(StoreError::InvalidName {
            what,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// One of the three stage trees an object passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Filled by the downloader; untrusted.
    Pending,
    /// Locked while digest and signature checks run.
    Verifying,
    /// Content-addressed, immutable, trusted.
    Verified,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Pending, Stage::Verifying, Stage::Verified];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verifying => "verifying",
            Self::Verified => "verified",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Resolves object paths under a single object root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn class_root(&self, class: ObjectClass) -> PathBuf {
        self.root.join(class.as_str())
    }

    pub fn stage_root(&self, class: ObjectClass, stage: Stage) -> PathBuf {
        self.class_root(class).join(stage.dir_name())
    }

    /// The per-digest directory, the unit of locking and removal.
    pub fn digest_dir(&self, class: ObjectClass, stage: Stage, digest: &str) -> PathBuf {
        self.stage_root(class, stage).join(digest)
    }

    pub fn object_path(&self, class: ObjectClass, stage: Stage, digest: &str, name: &str) -> PathBuf {
        self.digest_dir(class, stage, digest).join(name)
    }
}
