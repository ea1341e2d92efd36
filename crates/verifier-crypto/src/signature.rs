//! # Signature Validator
//!
//! Proves that an artifact digest was signed by a certificate chaining to
//! the device's root of trust.
//!
//! Certificates are never fetched here. The signer and intermediate
//! certificates named by a config's URLs are expected on local disk under
//! the certificate directory, stored by the last path component of their
//! URL. The root certificate is a single fixed file.
//!
//! ## Signature Encodings
//!
//! | Signer key | Signature bytes                           | Verified over |
//! |------------|-------------------------------------------|---------------|
//! | RSA        | raw PKCS#1 v1.5                           | SHA-256 digest (prehashed) |
//! | EC P-256   | base64 text of `r ‖ s`, 32 bytes each     | digest bytes directly |

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use rsa::pkcs1v15::Pkcs1v15Sign;
use sha2::Sha256;
use verifier_core::{url_to_filename, VerifyConfig};
use x509_cert::der::DecodePem;
use x509_cert::Certificate;

use crate::digest::FileDigest;
use crate::error::CryptoError;
use crate::trust::{CertPool, PublicKey};

const ECDSA_SIGNATURE_LEN: usize = 64;

/// Locations of the trust inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustConfig {
    /// PEM file holding the root certificate(s).
    pub root_certificate: PathBuf,
    /// Directory holding signer and intermediate certificates.
    pub certificate_dir: PathBuf,
}

/// Verifies detached signatures over artifact digests.
#[derive(Debug, Clone)]
pub struct SignatureValidator {
    trust: TrustConfig,
}

impl SignatureValidator {
    pub fn new(trust: TrustConfig) -> Self {
        Self { trust }
    }

    pub fn trust(&self) -> &TrustConfig {
        &self.trust
    }

    /// Verify the signature carried by `config` over `digest`.
    ///
    /// A config without a signature passes unchecked.
    pub fn verify(&self, digest: &FileDigest, config: &VerifyConfig) -> Result<(), CryptoError> {
        let signature = match config.signature.as_deref() {
            Some(sig) if !sig.is_empty() => sig,
            _ => {
                tracing::debug!(safename = %config.safename, "no signature; skipping check");
                return Ok(());
            }
        };

        let signer_url = config
            .signer_cert_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(CryptoError::MissingSignerCertificate)?;
        let signer = self.load_signer(signer_url)?;
        let pool = self.load_pool(&config.cert_chain_urls)?;
        pool.verify(&signer)?;

        match PublicKey::from_certificate(&signer)? {
            PublicKey::Rsa(key) => {
                key.verify(Pkcs1v15Sign::new::<Sha256>(), digest.as_bytes(), signature)
                    .map_err(|_| CryptoError::SignatureInvalid { algorithm: "rsa" })?;
            }
            PublicKey::EcP256(key) => {
                let raw = decode_ecdsa_signature(signature)?;
                let sig = p256::ecdsa::Signature::from_slice(&raw)
                    .map_err(|e| CryptoError::SignatureEncoding(e.to_string()))?;
                key.verify_prehash(digest.as_bytes(), &sig)
                    .map_err(|_| CryptoError::SignatureInvalid { algorithm: "ecdsa" })?;
            }
        }

        tracing::info!(safename = %config.safename, signer = signer_url, "signature verified");
        Ok(())
    }

    fn cert_path(&self, url: &str) -> PathBuf {
        self.trust.certificate_dir.join(url_to_filename(url))
    }

    fn load_signer(&self, url: &str) -> Result<Certificate, CryptoError> {
        let path = self.cert_path(url);
        let pem = read_certificate(&path)?;
        Certificate::from_pem(&pem).map_err(|e| CryptoError::CertificateDecode {
            name: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn load_pool(&self, chain_urls: &[String]) -> Result<CertPool, CryptoError> {
        let mut pool = CertPool::new();

        let root = &self.trust.root_certificate;
        let pem = std::fs::read(root).map_err(|_| CryptoError::RootCertificateMissing {
            path: root.display().to_string(),
        })?;
        append(&mut pool, &pem, root)?;

        for url in chain_urls {
            let path = self.cert_path(url);
            let pem = read_certificate(&path)?;
            append(&mut pool, &pem, &path)?;
        }
        tracing::debug!(certificates = pool.len(), "trust pool loaded");
        Ok(pool)
    }
}

fn read_certificate(path: &Path) -> Result<Vec<u8>, CryptoError> {
    std::fs::read(path).map_err(|e| {
        tracing::debug!(path = %path.display(), error = %e, "certificate read failed");
        CryptoError::CertificateRead {
            name: path.display().to_string(),
        }
    })
}

fn append(pool: &mut CertPool, pem: &[u8], path: &Path) -> Result<(), CryptoError> {
    let decode_err = |reason: String| CryptoError::CertificateDecode {
        name: path.display().to_string(),
        reason,
    };
    match pool.append_pem(pem) {
        Ok(0) => Err(decode_err("no certificate found".into())),
        Ok(_) => Ok(()),
        Err(e) => Err(decode_err(e.to_string())),
    }
}

/// EC signatures travel as base64 text of the fixed-width `r ‖ s` pair.
fn decode_ecdsa_signature(text: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let compact: Vec<u8> = text
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let raw = STANDARD
        .decode(&compact)
        .map_err(|e| CryptoError::SignatureEncoding(format!("invalid base64: {e}")))?;
    if raw.len() != ECDSA_SIGNATURE_LEN {
        return Err(CryptoError::SignatureEncoding(format!(
            "expected {ECDSA_SIGNATURE_LEN} signature bytes, got {}",
            raw.len()
        )));
    }
    Ok(raw)
}
