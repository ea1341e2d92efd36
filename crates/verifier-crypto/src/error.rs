//! # Verification Error Types
//!
//! Every variant here is a *recoverable* verification failure: the caller
//! records the message on the object's Status and waits for a corrected
//! config. Nothing in this crate is fatal to the process.

use thiserror::Error;

/// Errors from digest and signature verification.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The artifact could not be opened or read.
    #[error("unable to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Content digest differs from the claimed digest.
    #[error("computed {computed} configured {configured}")]
    DigestMismatch {
        /// Lowercase hex of the actual content.
        computed: String,
        /// The digest as claimed by the config.
        configured: String,
    },

    /// The signature was present but no signer certificate was named.
    #[error("signature present but no signer certificate configured")]
    MissingSignerCertificate,

    /// A certificate file could not be read.
    #[error("unable to read the certificate {name}")]
    CertificateRead { name: String },

    /// A certificate file did not contain a decodable certificate.
    #[error("unable to decode certificate {name}: {reason}")]
    CertificateDecode { name: String, reason: String },

    /// The root certificate file is missing.
    #[error("failed to find root certificate {path}")]
    RootCertificateMissing { path: String },

    /// The signer certificate does not chain to the trust pool.
    #[error("failed to verify certificate chain: {0}")]
    ChainVerification(String),

    /// The signature payload could not be decoded.
    #[error("signature decoding failed: {0}")]
    SignatureEncoding(String),

    /// Signature check against the signer key failed.
    #[error("{algorithm} image signature verification failed")]
    SignatureInvalid { algorithm: &'static str },

    /// The signer public key uses an algorithm this verifier does not handle.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_mismatch_mentions_both_values() {
        let err = CryptoError::DigestMismatch {
            computed: "aa".into(),
            configured: "BB".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("computed aa"));
        assert!(msg.contains("configured BB"));
    }

    #[test]
    fn signature_invalid_names_algorithm() {
        let err = CryptoError::SignatureInvalid { algorithm: "rsa" };
        assert_eq!(err.to_string(), "rsa image signature verification failed");
    }

    #[test]
    fn read_error_keeps_source() {
        let err = CryptoError::Read {
            path: "/x".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("gone"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
