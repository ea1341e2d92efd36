//! # verifier-reconcile — Reconciliation Engine
//!
//! Turns desired Configs into verified, immutable objects and observed
//! Status records.
//!
//! - [`Reconciler`]: Create / Modify / Delete for one object class.
//! - [`recover`]: the startup scan that rebuilds Status from the object
//!   store after a crash.
//! - [`ClassWorker`]: one ordered queue and one blocking consumer per
//!   class.
//!
//! Every operation returns `Result<_, FatalError>`. Verification failures
//! are not errors at this level: they end up in the Status record.

pub mod controller;
pub mod error;
pub mod event;
pub mod recovery;
pub mod worker;

pub use controller::Reconciler;
pub use error::FatalError;
pub use event::{ConfigChange, ConfigEvent};
pub use recovery::{recover, RecoveryReport};
pub use worker::{ChangeSender, ClassWorker};
