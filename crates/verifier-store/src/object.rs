//! # Object Store State Machine
//!
//! Moves artifact bytes through `pending → verifying → verified` for each
//! object class. There is no journal: which stage directory holds a file,
//! plus its permissions, is the whole state.
//!
//! ## Transition Order
//!
//! Every transition runs the same steps so a crash between any two of
//! them leaves a state crash recovery can classify:
//!
//! 1. check source and destination preconditions;
//! 2. create the destination digest directory;
//! 3. rename the file (atomic within one filesystem);
//! 4. tighten permissions (dir 0500, file 0400 in `verifying`);
//! 5. remove the now-empty source digest directory.
//!
//! ## Deduplication
//!
//! The verified store is keyed by digest alone. Promoting a second object
//! with a digest that is already present replaces the existing digest
//! directory; identical digests are presumed to mean identical bytes.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use verifier_core::{safename_to_filename, ObjectClass};

use crate::error::StoreError;
use crate::fsops::{self, LOCKED_DIR_MODE, LOCKED_FILE_MODE};
use crate::layout::{ensure_component, Stage, StoreLayout};

/// A file found in the verified store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VerifiedEntry {
    /// Name of the enclosing directory, trusted as the content digest.
    pub digest: String,
    /// The file name inside the digest directory.
    pub filename: String,
    pub path: PathBuf,
}

/// The object store for all classes under one object root.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    layout: StoreLayout,
    preserve_sentinel: PathBuf,
}

impl ObjectStore {
    /// Create a store rooted at `object_root`.
    ///
    /// While `preserve_sentinel` exists, verified content is never removed.
    pub fn new(object_root: impl Into<PathBuf>, preserve_sentinel: impl Into<PathBuf>) -> Self {
        Self {
            layout: StoreLayout::new(object_root),
            preserve_sentinel: preserve_sentinel.into(),
        }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn preserve_sentinel(&self) -> &Path {
        &self.preserve_sentinel
    }

    pub fn preserve_requested(&self) -> bool {
        self.preserve_sentinel.exists()
    }

    /// Create every stage root of every class.
    pub fn prepare(&self) -> Result<(), StoreError> {
        for class in ObjectClass::ALL {
            for stage in Stage::ALL {
                fsops::create_dir_all(&self.layout.stage_root(class, stage))?;
            }
        }
        Ok(())
    }

    /// Discard all `pending` and `verifying` content, then recreate the
    /// empty stage roots.
    pub fn clear_in_progress(&self) -> Result<(), StoreError> {
        for class in ObjectClass::ALL {
            for stage in [Stage::Pending, Stage::Verifying] {
                let root = self.layout.stage_root(class, stage);
                if fsops::remove_tree(&root)? {
                    tracing::info!(%class, path = %root.display(), "cleared in-progress objects");
                }
                fsops::create_dir_all(&root)?;
            }
        }
        Ok(())
    }

    /// Move a downloaded object from `pending` into the locked `verifying`
    /// area. Returns the new path.
    ///
    /// A missing pending source is the only recoverable failure.
    pub fn promote_to_verifying(
        &self,
        class: ObjectClass,
        digest: &str,
        safename: &str,
    ) -> Result<PathBuf, StoreError> {
        ensure_component("digest", digest)?;
        ensure_component("safename", safename)?;
        let src_dir = self.layout.digest_dir(class, Stage::Pending, digest);
        let src = src_dir.join(safename);
        if !exists(&src)? {
            return Err(StoreError::SourceMissing {
                stage: Stage::Pending,
                path: src,
            });
        }

        let dest_dir = self.layout.digest_dir(class, Stage::Verifying, digest);
        let dest = dest_dir.join(safename);
        if exists(&dest)? {
            return Err(StoreError::AlreadyPresent {
                stage: Stage::Verifying,
                path: dest,
            });
        }
        if fsops::remove_tree(&dest_dir)? {
            tracing::debug!(%class, path = %dest_dir.display(), "removed stale verifying directory");
        }

        fsops::create_dir_all(&dest_dir)?;
        fsops::unlock_dir(&src_dir)?;
        fsops::rename(&src, &dest)?;
        fsops::set_mode(&dest_dir, LOCKED_DIR_MODE)?;
        fsops::set_mode(&dest, LOCKED_FILE_MODE)?;
        fsops::remove_tree(&src_dir)?;

        tracing::info!(%class, safename, digest, "moved to verifying");
        Ok(dest)
    }

    /// Move a checked object from `verifying` into the verified store under
    /// its final name. Returns the new path.
    pub fn promote_to_verified(
        &self,
        class: ObjectClass,
        digest: &str,
        safename: &str,
    ) -> Result<PathBuf, StoreError> {
        ensure_component("digest", digest)?;
        ensure_component("safename", safename)?;
        let src_dir = self.layout.digest_dir(class, Stage::Verifying, digest);
        let src = src_dir.join(safename);
        if !exists(&src)? {
            return Err(StoreError::SourceMissing {
                stage: Stage::Verifying,
                path: src,
            });
        }

        let final_name = safename_to_filename(safename);
        ensure_component("filename", &final_name)?;
        let dest_dir = self.layout.digest_dir(class, Stage::Verified, digest);
        let dest = dest_dir.join(&final_name);
        if exists(&dest)? {
            return Err(StoreError::AlreadyPresent {
                stage: Stage::Verified,
                path: dest,
            });
        }
        if exists(&dest_dir)? {
            self.replace_collision(class, digest, &dest_dir)?;
        }

        fsops::create_dir_all(&dest_dir)?;
        fsops::unlock_dir(&src_dir)?;
        fsops::rename(&src, &dest)?;
        fsops::set_mode(&dest_dir, LOCKED_DIR_MODE)?;
        fsops::remove_tree(&src_dir)?;

        tracing::info!(%class, safename, digest, final_name = %final_name, "moved to verified");
        Ok(dest)
    }

    fn replace_collision(&self, class: ObjectClass, digest: &str, dir: &Path) -> Result<(), StoreError> {
        let entries = fs::read_dir(dir).map_err(StoreError::io("readdir", dir))?;
        for entry in entries {
            let entry = entry.map_err(StoreError::io("readdir", dir))?;
            tracing::warn!(
                %class,
                digest,
                existing = %entry.file_name().to_string_lossy(),
                "verified digest collision; replacing"
            );
        }
        fsops::remove_tree(dir)?;
        Ok(())
    }

    /// Remove every trace of an object.
    ///
    /// `pending` and `verifying` content is always removed. Verified content
    /// is removed only for a delivered object, and only while the preserve
    /// sentinel is absent. A digest that is not a single path component is
    /// rejected before anything is touched.
    pub fn remove_object(&self, class: ObjectClass, digest: &str, delivered: bool) -> Result<(), StoreError> {
        ensure_component("digest", digest)?;
        for stage in [Stage::Pending, Stage::Verifying] {
            let dir = self.layout.digest_dir(class, stage, digest);
            if fsops::remove_tree(&dir)? {
                tracing::debug!(%class, %stage, digest, "removed object directory");
            }
        }

        if !delivered {
            return Ok(());
        }
        let verified = self.layout.digest_dir(class, Stage::Verified, digest);
        if self.preserve_requested() {
            tracing::info!(%class, digest, path = %verified.display(), "preserve requested; keeping verified content");
            return Ok(());
        }
        if fsops::remove_tree(&verified)? {
            tracing::info!(%class, digest, "removed verified content");
        }
        Ok(())
    }

    /// Every file in the verified store of a class, sorted by digest then
    /// filename.
    pub fn scan_verified(&self, class: ObjectClass) -> Result<Vec<VerifiedEntry>, StoreError> {
        let root = self.layout.stage_root(class, Stage::Verified);
        let mut found = Vec::new();
        if exists(&root)? {
            walk(&root, &mut found)?;
        }
        found.sort();
        Ok(found)
    }
}

fn walk(dir: &Path, found: &mut Vec<VerifiedEntry>) -> Result<(), StoreError> {
    for entry in fs::read_dir(dir).map_err(StoreError::io("readdir", dir))? {
        let entry = entry.map_err(StoreError::io("readdir", dir))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(StoreError::io("stat", &path))?;
        if file_type.is_dir() {
            walk(&path, found)?;
        } else {
            let digest = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            found.push(VerifiedEntry {
                digest,
                filename: entry.file_name().to_string_lossy().into_owned(),
                path,
            });
        }
    }
    Ok(())
}

fn exists(path: &Path) -> Result<bool, StoreError> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io("stat", path)(e)),
    }
}
