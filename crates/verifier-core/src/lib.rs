//! # verifier-core — Foundational Types for the Image Verifier
//!
//! Defines the records and conventions shared by every other crate in the
//! workspace. It depends on nothing internal.
//!
//! ## Contents
//!
//! - **`ObjectClass`**: the two parallel pipelines (application images and
//!   base-OS images). Every directory path the verifier touches is keyed by
//!   a class, so the pipelines never share mutable state.
//!
//! - **`VerifyConfig` / `VerifyStatus`**: the desired and observed records.
//!   Config is delivered from outside and never mutated; Status is owned by
//!   the reconciler and persisted as one JSON file per object.
//!
//! - **Naming**: the URL→filename and safename→filename conventions used
//!   to locate certificates and to name verified artifacts.
//!
//! ## Crate Policy
//!
//! - No filesystem access. Persistence lives in `verifier-store`.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod class;
pub mod naming;
pub mod record;

pub use class::ObjectClass;
pub use naming::{safename_to_filename, synthesize_safename, url_to_filename};
pub use record::{VerifyConfig, VerifyState, VerifyStatus};
