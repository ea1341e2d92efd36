//! # Fatal Errors
//!
//! Recoverable verification failures never leave the controller: they are
//! recorded on the Status. Anything that reaches a caller as a
//! [`FatalError`] means on-disk state no longer matches what the
//! controller expects, and the process must stop so that crash recovery
//! can rebuild it.

use thiserror::Error;
use verifier_core::ObjectClass;
use verifier_store::{StatusError, StoreError};

#[derive(Error, Debug)]
pub enum FatalError {
    /// The object store is inconsistent or unwritable.
    #[error("object store: {0}")]
    Store(#[from] StoreError),

    /// A Status record could not be persisted.
    #[error("status store: {0}")]
    Status(#[from] StatusError),

    /// A class worker stopped without reporting a result.
    #[error("{class} worker terminated: {reason}")]
    WorkerLost { class: ObjectClass, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use verifier_store::Stage;

    #[test]
    fn store_error_is_wrapped_with_context() {
        let err: FatalError = StoreError::AlreadyPresent {
            stage: Stage::Verified,
            path: "/o/verified/abc/img".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "object store: verified object /o/verified/abc/img already exists"
        );
    }

    #[test]
    fn worker_lost_names_class() {
        let err = FatalError::WorkerLost {
            class: ObjectClass::BaseOs,
            reason: "panicked".into(),
        };
        assert_eq!(err.to_string(), "baseOs.obj worker terminated: panicked");
    }
}
