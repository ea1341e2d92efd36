//! # Digest Engine
//!
//! Streams an artifact through SHA-256 and compares the result with the
//! digest claimed by its config. Comparison is case-insensitive on the
//! claimed side; the computed value is always lowercase hex.
//!
//! A mismatch is reported as [`CryptoError::DigestMismatch`]. It is a
//! recoverable failure: the claimed digest, not the file, is presumed wrong
//! until a corrected config arrives.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::CryptoError;

/// A computed SHA-256 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileDigest([u8; 32]);

impl FileDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw 32 digest bytes, as signed by the image publisher.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }

    /// Case-insensitive comparison against a claimed hex digest. The claim
    /// also names the store directory, so surrounding whitespace is not
    /// ignored.
    pub fn matches(&self, claimed: &str) -> bool {
        self.to_hex() == claimed.to_ascii_lowercase()
    }
}

impl std::fmt::Display for FileDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute the SHA-256 digest of a file, reading it in 64 KiB chunks.
pub fn sha256_file(path: &Path) -> Result<FileDigest, CryptoError> {
    let read_err = |source| CryptoError::Read {
        path: path.display().to_string(),
        source,
    };
    let mut file = File::open(path).map_err(read_err)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(read_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(FileDigest(hasher.finalize().into()))
}

/// Compute the digest of `path` and require it to match `claimed`.
///
/// Returns the computed digest so the signature step can verify over the
/// same bytes.
pub fn verify_file_digest(path: &Path, claimed: &str) -> Result<FileDigest, CryptoError> {
    let digest = sha256_file(path)?;
    if !digest.matches(claimed) {
        tracing::debug!(
            computed = %digest,
            configured = %claimed.to_ascii_lowercase(),
            path = %path.display(),
            "digest mismatch"
        );
        return Err(CryptoError::DigestMismatch {
            computed: digest.to_hex(),
            configured: claimed.to_string(),
        });
    }
    Ok(digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
