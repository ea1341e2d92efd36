//! # Config and Status Records
//!
//! `VerifyConfig` is the desired state handed to the verifier by the
//! delivery mechanism. `VerifyStatus` is the observed state the verifier
//! writes back, one file per object, and the only durable record of where
//! an object is in its lifecycle.
//!
//! ## Lifecycle
//!
//! ```text
//! create:  Downloaded + pending_add ──► Delivered        (success)
//!                                   └─► Initial + error  (recoverable failure)
//! modify:  ref_count == 0           ──► Initial          (content removed)
//! delete:  status file removed
//! ```
//!
//! The pending flags are only true while a controller operation is in
//! flight, so a record found with one set after a restart marks an
//! interrupted operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Desired state for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Unique identifier, also the leaf filename in `pending`/`verifying`.
    pub safename: String,
    /// Where the artifact was downloaded from. Diagnostics only.
    #[serde(default)]
    pub download_url: String,
    /// Hex-encoded SHA-256 the content must match.
    pub claimed_digest: String,
    /// Number of consumers; zero means the object may be deleted.
    #[serde(default)]
    pub ref_count: u32,
    /// Detached signature over the digest, base64 in JSON.
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub signature: Option<Vec<u8>>,
    /// URL of the signer certificate, resolved to a local file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_cert_url: Option<String>,
    /// URLs of intermediate certificates, resolved to local files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cert_chain_urls: Vec<String>,
}

impl VerifyConfig {
    /// Whether a non-empty signature accompanies this config.
    pub fn has_signature(&self) -> bool {
        self.signature.as_ref().is_some_and(|s| !s.is_empty())
    }
}

/// Verification progress of an object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerifyState {
    /// Not yet verified, or verification failed.
    #[default]
    Initial,
    /// Content is in the verifying area; checks in flight.
    Downloaded,
    /// Checks passed; content is in the verified store.
    Delivered,
}

impl VerifyState {
    /// Canonical upper-case name, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::Downloaded => "DOWNLOADED",
            Self::Delivered => "DELIVERED",
        }
    }
}

impl std::fmt::Display for VerifyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed state for one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyStatus {
    pub safename: String,
    pub claimed_digest: String,
    #[serde(default)]
    pub state: VerifyState,
    #[serde(default)]
    pub pending_add: bool,
    #[serde(default)]
    pub pending_modify: bool,
    #[serde(default)]
    pub pending_delete: bool,
    #[serde(default)]
    pub ref_count: u32,
    /// Last recoverable failure; empty when none.
    #[serde(default)]
    pub last_error: String,
    #[serde(default)]
    pub last_error_time: Option<DateTime<Utc>>,
}

impl VerifyStatus {
    /// The record written when a Create begins.
    pub fn for_create(config: &VerifyConfig) -> Self {
        Self {
            safename: config.safename.clone(),
            claimed_digest: config.claimed_digest.clone(),
            state: VerifyState::Downloaded,
            pending_add: true,
            ref_count: config.ref_count,
            ..Self::default()
        }
    }

    /// The record synthesized by crash recovery for verified content.
    pub fn recovered(safename: String, digest: String) -> Self {
        Self {
            safename,
            claimed_digest: digest,
            state: VerifyState::Delivered,
            ..Self::default()
        }
    }

    /// Record a recoverable failure: back to `Initial`, add no longer pending.
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = error.into();
        self.last_error_time = Some(Utc::now());
        self.pending_add = false;
        self.state = VerifyState::Initial;
    }

    /// Record a completed Create.
    pub fn mark_delivered(&mut self) {
        self.state = VerifyState::Delivered;
        self.pending_add = false;
        self.last_error.clear();
        self.last_error_time = None;
    }

    /// Whether the content identity (name and digest) matches a config.
    pub fn same_identity(&self, config: &VerifyConfig) -> bool {
        self.safename == config.safename && self.claimed_digest == config.claimed_digest
    }

    pub fn has_error(&self) -> bool {
        !self.last_error.is_empty()
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}
