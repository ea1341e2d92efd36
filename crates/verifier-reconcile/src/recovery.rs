//! # Crash Recovery
//!
//! Rebuilds Status records from on-disk evidence after a restart. Runs once
//! at startup, before any event is processed, in four ordered phases:
//!
//! 1. discard all `pending` and `verifying` content (work in flight when the
//!    process died is redone on re-delivery);
//! 2. mark every existing Status `pending_delete`;
//! 3. write a `Delivered` Status for every file in the verified store,
//!    named `<filename>.<digest>`;
//! 4. delete every Status still marked `pending_delete`.
//!
//! Verified content is trusted as found: the enclosing directory name is
//! taken as its digest and it is not re-hashed.

use verifier_core::{synthesize_safename, ObjectClass, VerifyStatus};
use verifier_store::{ObjectStore, StatusStore};

use crate::error::FatalError;

/// Counts of what each recovery phase did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Status records marked for deletion in phase 2.
    pub marked: usize,
    /// Status files skipped because they could not be read.
    pub skipped: usize,
    /// Status records written for verified content in phase 3.
    pub restored: usize,
    /// Status records deleted in phase 4.
    pub removed: usize,
}

/// Run all four recovery phases over every object class.
pub fn recover(objects: &ObjectStore, statuses: &StatusStore) -> Result<RecoveryReport, FatalError> {
    let mut report = RecoveryReport::default();

    objects.clear_in_progress()?;
    statuses.prepare()?;

    for class in ObjectClass::ALL {
        mark_all(class, statuses, &mut report)?;
    }
    for class in ObjectClass::ALL {
        restore_verified(class, objects, statuses, &mut report)?;
    }
    for class in ObjectClass::ALL {
        sweep(class, statuses, &mut report)?;
    }

    tracing::info!(
        marked = report.marked,
        skipped = report.skipped,
        restored = report.restored,
        removed = report.removed,
        "crash recovery complete"
    );
    Ok(report)
}

fn mark_all(class: ObjectClass, statuses: &StatusStore, report: &mut RecoveryReport) -> Result<(), FatalError> {
    for path in statuses.list(class)? {
        match statuses.read(&path) {
            Ok(Some(mut status)) => {
                status.pending_delete = true;
                statuses.write(&path, &status)?;
                report.marked += 1;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%class, error = %err, "skipping unreadable status");
                report.skipped += 1;
            }
        }
    }
    Ok(())
}

fn restore_verified(
    class: ObjectClass,
    objects: &ObjectStore,
    statuses: &StatusStore,
    report: &mut RecoveryReport,
) -> Result<(), FatalError> {
    for entry in objects.scan_verified(class)? {
        let safename = synthesize_safename(&entry.filename, &entry.digest);
        let path = statuses.path_for(class, &safename);
        tracing::debug!(%class, safename = %safename, path = %entry.path.display(), "restoring verified object");
        statuses.write(&path, &VerifyStatus::recovered(safename, entry.digest))?;
        report.restored += 1;
    }
    Ok(())
}

fn sweep(class: ObjectClass, statuses: &StatusStore, report: &mut RecoveryReport) -> Result<(), FatalError> {
    for path in statuses.list(class)? {
        // Unreadable files were already counted in phase 2.
        if let Ok(Some(status)) = statuses.read(&path) {
            if status.pending_delete {
                tracing::info!(%class, safename = %status.safename, "removing status without verified content");
                statuses.remove(&path)?;
                report.removed += 1;
            }
        }
    }
    Ok(())
}
