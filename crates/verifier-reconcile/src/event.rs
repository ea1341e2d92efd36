//! Inbound events.
//!
//! The delivery mechanism only knows whether a Config is present or gone
//! ([`ConfigChange`]). The controller resolves that against the Status on
//! disk into the operation to run ([`ConfigEvent`]).

use std::path::{Path, PathBuf};

use verifier_core::{VerifyConfig, VerifyStatus};

/// A change observed by the delivery mechanism, keyed by status path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    /// A config was added or rewritten.
    Present {
        status_path: PathBuf,
        config: VerifyConfig,
    },
    /// No config exists for this status path any more.
    Absent { status_path: PathBuf },
}

impl ConfigChange {
    pub fn status_path(&self) -> &Path {
        match self {
            Self::Present { status_path, .. } | Self::Absent { status_path } => status_path,
        }
    }
}

/// A resolved controller operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEvent {
    Create {
        status_path: PathBuf,
        config: VerifyConfig,
    },
    Modify {
        status_path: PathBuf,
        config: VerifyConfig,
        status: VerifyStatus,
    },
    Delete {
        status_path: PathBuf,
        status: VerifyStatus,
    },
}

impl ConfigEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Modify { .. } => "modify",
            Self::Delete { .. } => "delete",
        }
    }
}
