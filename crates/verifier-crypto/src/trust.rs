//! # Certificate Trust Pool
//!
//! A flat pool of trusted X.509 certificates. The root certificate and
//! every intermediate named by a config are added side by side, and each
//! pool member is a trust anchor in its own right: a signer certificate is
//! trusted when it is itself in the pool, or when a pool member issued it.
//!
//! ## Issuance Check
//!
//! For a candidate issuer the pool requires, in order:
//!
//! 1. issuer subject equals the signer's issuer name;
//! 2. the candidate is currently valid and, when it carries a basic
//!    constraints extension, is marked as a CA;
//! 3. the signer's TBS bytes verify under the candidate's public key.
//!
//! ## Extended Key Usage
//!
//! Neither the signer nor its issuer may carry an extended key usage
//! extension that excludes server authentication. A certificate without
//! the extension, or one listing `anyExtendedKeyUsage`, is acceptable.
//!
//! Supported certificate signature algorithms are RSA PKCS#1 v1.5 with
//! SHA-256/384/512 and ECDSA P-256 with SHA-256.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use der::asn1::ObjectIdentifier;
use der::oid::AssociatedOid;
use der::Encode;
use p256::ecdsa::signature::Verifier;
use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_cert::ext::pkix::{BasicConstraints, ExtendedKeyUsage};
use x509_cert::Certificate;

use crate::error::CryptoError;

pub(crate) const RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
pub(crate) const ID_EC_PUBLIC_KEY: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const ID_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

const KP_SERVER_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.1");
const ANY_EXTENDED_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37.0");

/// A public key this verifier can check signatures with.
#[derive(Debug, Clone)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcP256(p256::ecdsa::VerifyingKey),
}

impl PublicKey {
    /// Extract the subject public key of a certificate.
    pub fn from_certificate(cert: &Certificate) -> Result<Self, CryptoError> {
        use p256::pkcs8::DecodePublicKey as _;

        let spki = &cert.tbs_certificate.subject_public_key_info;
        let der = spki
            .to_der()
            .map_err(|e| CryptoError::UnsupportedKeyType(format!("unencodable key: {e}")))?;
        let oid = spki.algorithm.oid;

        if oid == RSA_ENCRYPTION {
            RsaPublicKey::from_public_key_der(&der)
                .map(Self::Rsa)
                .map_err(|e| CryptoError::UnsupportedKeyType(format!("malformed RSA key: {e}")))
        } else if oid == ID_EC_PUBLIC_KEY {
            p256::ecdsa::VerifyingKey::from_public_key_der(&der)
                .map(Self::EcP256)
                .map_err(|_| CryptoError::UnsupportedKeyType("elliptic curve other than P-256".into()))
        } else if oid == ID_ED25519 {
            Err(CryptoError::UnsupportedKeyType("Ed25519".into()))
        } else {
            Err(CryptoError::UnsupportedKeyType(oid.to_string()))
        }
    }
}

/// The set of certificates a signer may chain to.
#[derive(Debug, Clone, Default)]
pub struct CertPool {
    certs: Vec<Certificate>,
}

impl CertPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every certificate in a PEM bundle. Returns how many were added.
    pub fn append_pem(&mut self, pem: &[u8]) -> Result<usize, der::Error> {
        if pem.iter().all(u8::is_ascii_whitespace) {
            return Ok(0);
        }
        let certs = Certificate::load_pem_chain(pem)?;
        let added = certs.len();
        self.certs.extend(certs);
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Check that `leaf` chains to this pool at the current time.
    pub fn verify(&self, leaf: &Certificate) -> Result<(), CryptoError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        self.verify_at(leaf, now)
    }

    /// Check that `leaf` chains to this pool at `now` (time since epoch).
    pub fn verify_at(&self, leaf: &Certificate, now: Duration) -> Result<(), CryptoError> {
        check_validity(leaf, now).map_err(CryptoError::ChainVerification)?;
        check_key_usage(leaf).map_err(CryptoError::ChainVerification)?;

        if self.certs.iter().any(|c| c == leaf) {
            return Ok(());
        }

        let issuer_name = &leaf.tbs_certificate.issuer;
        let mut last_failure = None;
        for candidate in self
            .certs
            .iter()
            .filter(|c| &c.tbs_certificate.subject == issuer_name)
        {
            match check_issuer(leaf, candidate, now) {
                Ok(()) => return Ok(()),
                Err(reason) => {
                    tracing::debug!(issuer = %issuer_name, %reason, "candidate issuer rejected");
                    last_failure = Some(reason);
                }
            }
        }

        Err(CryptoError::ChainVerification(last_failure.unwrap_or_else(
            || format!("no trusted issuer named {issuer_name}"),
        )))
    }
}

fn check_validity(cert: &Certificate, now: Duration) -> Result<(), String> {
    let validity = &cert.tbs_certificate.validity;
    if now < validity.not_before.to_unix_duration() {
        return Err(format!(
            "certificate {} is not yet valid",
            cert.tbs_certificate.subject
        ));
    }
    if now > validity.not_after.to_unix_duration() {
        return Err(format!(
            "certificate {} has expired",
            cert.tbs_certificate.subject
        ));
    }
    Ok(())
}

fn check_key_usage(cert: &Certificate) -> Result<(), String> {
    match cert.tbs_certificate.get::<ExtendedKeyUsage>() {
        Ok(Some((_, ExtendedKeyUsage(usages))))
            if !usages
                .iter()
                .any(|u| *u == KP_SERVER_AUTH || *u == ANY_EXTENDED_KEY_USAGE) =>
        {
            Err(format!(
                "certificate {} is not valid for server authentication",
                cert.tbs_certificate.subject
            ))
        }
        Ok(_) => Ok(()),
        Err(e) => Err(format!("malformed extended key usage: {e}")),
    }
}

fn check_issuer(child: &Certificate, issuer: &Certificate, now: Duration) -> Result<(), String> {
    check_validity(issuer, now)?;

    match issuer.tbs_certificate.get::<BasicConstraints>() {
        Ok(Some((_, constraints))) if !constraints.ca => {
            return Err(format!(
                "issuer {} is not a certificate authority",
                issuer.tbs_certificate.subject
            ));
        }
        Ok(_) => {}
        Err(e) => return Err(format!("malformed basic constraints: {e}")),
    }
    check_key_usage(issuer)?;

    let tbs = child
        .tbs_certificate
        .to_der()
        .map_err(|e| format!("unencodable certificate body: {e}"))?;
    let signature = child
        .signature
        .as_bytes()
        .ok_or_else(|| "certificate signature is not octet aligned".to_string())?;
    let key = PublicKey::from_certificate(issuer).map_err(|e| e.to_string())?;
    let algorithm = child.signature_algorithm.oid;

    let verified = match key {
        PublicKey::Rsa(key) if algorithm == SHA256_WITH_RSA => {
            rsa_verify::<Sha256>(&key, &tbs, signature)
        }
        PublicKey::Rsa(key) if algorithm == SHA384_WITH_RSA => {
            rsa_verify::<Sha384>(&key, &tbs, signature)
        }
        PublicKey::Rsa(key) if algorithm == SHA512_WITH_RSA => {
            rsa_verify::<Sha512>(&key, &tbs, signature)
        }
        PublicKey::EcP256(key) if algorithm == ECDSA_WITH_SHA256 => {
            p256::ecdsa::Signature::from_der(signature)
                .map(|sig| key.verify(&tbs, &sig).is_ok())
                .unwrap_or(false)
        }
        _ => {
            return Err(format!(
                "unsupported certificate signature algorithm {algorithm}"
            ))
        }
    };

    if verified {
        Ok(())
    } else {
        Err(format!(
            "signature on {} does not verify under {}",
            child.tbs_certificate.subject, issuer.tbs_certificate.subject
        ))
    }
}

fn rsa_verify<D>(key: &RsaPublicKey, message: &[u8], signature: &[u8]) -> bool
where
    D: Digest + AssociatedOid,
{
    let hashed = D::digest(message);
    key.verify(Pkcs1v15Sign::new::<D>(), &hashed, signature)
        .is_ok()
}
