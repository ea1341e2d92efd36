//! # verifier-store — On-Disk State
//!
//! The verifier keeps no database and no journal. Its entire durable state
//! is two directory trees:
//!
//! - the **object store** ([`ObjectStore`]), where the stage directory that
//!   holds an artifact (`pending`, `verifying` or `verified`) and its
//!   permissions record how far verification got;
//! - the **status store** ([`StatusStore`]), one JSON [`VerifyStatus`] per
//!   object.
//!
//! Both are laid out per [`ObjectClass`], so the two class pipelines never
//! touch the same paths.
//!
//! ## Error Policy
//!
//! Apart from [`StoreError::SourceMissing`] for a pending object and
//! [`StoreError::InvalidName`] for a digest or safename that would leave
//! its stage directory, every error here signals an inconsistency the caller must treat as fatal.
//!
//! [`VerifyStatus`]: verifier_core::VerifyStatus
//! [`ObjectClass`]: verifier_core::ObjectClass

pub mod error;
mod fsops;
pub mod layout;
pub mod object;
pub mod status;

pub use error::{StatusError, StoreError};
pub use layout::{ensure_component, Stage, StoreLayout};
pub use object::{ObjectStore, VerifiedEntry};
pub use status::StatusStore;
