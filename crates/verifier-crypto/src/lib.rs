//! # verifier-crypto — Authenticity Checks
//!
//! Two checks stand between a downloaded artifact and the verified store:
//!
//! - **digest**: the content's SHA-256 must equal the digest claimed by
//!   its config ([`verify_file_digest`]).
//! - **signature**: when the config carries a signature, it must verify
//!   over that digest under a signer certificate chaining to the device
//!   root of trust ([`SignatureValidator`]).
//!
//! All failures are [`CryptoError`] values. None of them is fatal: the
//! caller records the message and waits for a corrected config.
//!
//! ## Crate Policy
//!
//! - Pure Rust cryptography (`sha2`, `rsa`, `p256`, `x509-cert`).
//! - No network access. Certificates are read from local files only.

pub mod digest;
pub mod error;
pub mod signature;
pub mod trust;

pub use digest::{sha256_file, verify_file_digest, FileDigest};
pub use error::CryptoError;
pub use signature::{SignatureValidator, TrustConfig};
pub use trust::{CertPool, PublicKey};
