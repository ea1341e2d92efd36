//! # Config-Directory Poller
//!
//! The delivery mechanism: watches `<config_root>/<class>/config/*.json`
//! and turns what it sees into [`ConfigChange`]s for the class worker.
//!
//! A config file is identified by its stem, which is also the stem of the
//! Status file it drives. Files are fingerprinted by length and
//! modification time; only a new or changed fingerprint is re-read.
//!
//! On its first pass the poller also reports every Status that has no
//! config as absent, so objects restored by crash recovery without a
//! desired counterpart are cleaned up.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use verifier_core::{ObjectClass, VerifyConfig};
use verifier_reconcile::{ChangeSender, ConfigChange};
use verifier_store::StatusStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

/// Polls one class config directory.
#[derive(Debug)]
pub struct ConfigPoller {
    class: ObjectClass,
    config_dir: PathBuf,
    statuses: StatusStore,
    seen: HashMap<String, Fingerprint>,
    first_pass: bool,
}

impl ConfigPoller {
    pub fn new(class: ObjectClass, config_dir: impl Into<PathBuf>, statuses: StatusStore) -> Self {
        Self {
            class,
            config_dir: config_dir.into(),
            statuses,
            seen: HashMap::new(),
            first_pass: true,
        }
    }

    /// Scan once and return the changes since the previous scan.
    pub fn poll(&mut self) -> Vec<ConfigChange> {
        let mut changes = Vec::new();
        let current = self.list_configs();

        for (key, path) in &current {
            let fingerprint = match fs::metadata(path) {
                Ok(meta) => Fingerprint {
                    len: meta.len(),
                    modified: meta.modified().ok(),
                },
                Err(err) => {
                    tracing::debug!(class = %self.class, path = %path.display(), error = %err, "config vanished during scan");
                    continue;
                }
            };
            if self.seen.get(key) == Some(&fingerprint) {
                continue;
            }
            self.seen.insert(key.clone(), fingerprint);
            match read_config(path) {
                Ok(config) => changes.push(ConfigChange::Present {
                    status_path: self.statuses.path_for(self.class, key),
                    config,
                }),
                Err(err) => {
                    tracing::warn!(class = %self.class, path = %path.display(), %err, "skipping undecodable config");
                }
            }
        }

        let gone: Vec<String> = self
            .seen
            .keys()
            .filter(|key| !current.contains_key(*key))
            .cloned()
            .collect();
        for key in gone {
            self.seen.remove(&key);
            changes.push(ConfigChange::Absent {
                status_path: self.statuses.path_for(self.class, &key),
            });
        }

        if std::mem::take(&mut self.first_pass) {
            changes.extend(self.orphaned_statuses(&current));
        }
        changes
    }

    /// Poll every `interval` and forward changes until the worker's queue
    /// closes.
    pub async fn run(mut self, sender: ChangeSender, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            for change in self.poll() {
                if sender.send(change).is_err() {
                    tracing::debug!(class = %self.class, "worker queue closed; poller exiting");
                    return;
                }
            }
        }
    }

    fn list_configs(&self) -> HashMap<String, PathBuf> {
        let entries = match fs::read_dir(&self.config_dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(class = %self.class, dir = %self.config_dir.display(), error = %err, "cannot list config directory");
                return HashMap::new();
            }
        };
        entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .filter_map(|path| json_stem(&path).map(|stem| (stem, path)))
            .collect()
    }

    fn orphaned_statuses(&self, current: &HashMap<String, PathBuf>) -> Vec<ConfigChange> {
        let paths = match self.statuses.list(self.class) {
            Ok(paths) => paths,
            Err(err) => {
                tracing::warn!(class = %self.class, error = %err, "cannot list status directory");
                return Vec::new();
            }
        };
        paths
            .into_iter()
            .filter(|path| json_stem(path).is_some_and(|stem| !current.contains_key(&stem)))
            .map(|status_path| {
                tracing::info!(class = %self.class, path = %status_path.display(), "status without config");
                ConfigChange::Absent { status_path }
            })
            .collect()
    }
}

fn json_stem(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_owned)
}

fn read_config(path: &Path) -> anyhow::Result<VerifyConfig> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
