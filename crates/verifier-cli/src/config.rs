//! # Daemon Configuration
//!
//! Loaded from an optional YAML file. Every field has a default matching
//! the device layout, so an empty file (or no file) is a valid
//! configuration. Command-line flags override individual roots after
//! loading.
//!
//! ```yaml
//! object_root: /persist/downloads
//! status_root: /var/run/verifier
//! config_root: /var/tmp/verifier
//! root_certificate: /config/root-certificate.pem
//! certificate_dir: /var/tmp/zedmanager/certs
//! poll_interval_ms: 1000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use verifier_core::ObjectClass;
use verifier_crypto::TrustConfig;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Root of the per-class `pending`/`verifying`/`verified` trees.
    pub object_root: PathBuf,
    /// Root of the per-class status directories.
    pub status_root: PathBuf,
    /// Root of the per-class config directories and the preserve sentinel.
    pub config_root: PathBuf,
    pub root_certificate: PathBuf,
    pub certificate_dir: PathBuf,
    pub poll_interval_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            object_root: PathBuf::from("/persist/downloads"),
            status_root: PathBuf::from("/var/run/verifier"),
            config_root: PathBuf::from("/var/tmp/verifier"),
            root_certificate: PathBuf::from("/config/root-certificate.pem"),
            certificate_dir: PathBuf::from("/var/tmp/zedmanager/certs"),
            poll_interval_ms: 1000,
        }
    }
}

impl DaemonConfig {
    /// Load from `path`, or return the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration file: {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing configuration file: {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        // An empty document deserializes as null, not as an empty mapping.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text)?;
        ensure!(config.poll_interval_ms > 0, "poll_interval_ms must be positive");
        Ok(config)
    }

    /// Directory the delivery side writes Config files into.
    pub fn config_dir(&self, class: ObjectClass) -> PathBuf {
        self.config_root.join(class.as_str()).join("config")
    }

    /// While this file exists, verified content is never deleted.
    pub fn preserve_sentinel(&self) -> PathBuf {
        self.config_root.join("config").join("preserve")
    }

    pub fn trust(&self) -> TrustConfig {
        TrustConfig {
            root_certificate: self.root_certificate.clone(),
            certificate_dir: self.certificate_dir.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
