//! # Reconciliation Controller
//!
//! Drives one object class from its desired Configs toward Status records
//! on disk. The same [`Reconciler`] type serves both classes; the class is
//! a field and only selects directory subtrees.
//!
//! ## Operations
//!
//! | Event  | Effect |
//! |--------|--------|
//! | Create | write `Downloaded` + `pending_add`, move `pending → verifying`, check digest and signature, move `verifying → verified`, mark `Delivered` |
//! | Modify | `ref_count == 0` removes content and resets to `Initial`; a changed identity deletes the old object and creates the new one; anything else is a no-op |
//! | Delete | remove content, then remove the Status file |
//!
//! Recoverable failures (pending source missing, digest mismatch, any
//! signature failure) end the operation with `state = Initial` and the
//! message in `last_error`. Every other failure is returned as a
//! [`FatalError`].

use std::path::{Path, PathBuf};

use verifier_core::{ObjectClass, VerifyConfig, VerifyState, VerifyStatus};
use verifier_crypto::{verify_file_digest, CryptoError, SignatureValidator};
use verifier_store::{ObjectStore, StatusError, StatusStore};

use crate::error::FatalError;
use crate::event::{ConfigChange, ConfigEvent};

/// The reconciler for one object class.
#[derive(Debug, Clone)]
pub struct Reconciler {
    class: ObjectClass,
    objects: ObjectStore,
    statuses: StatusStore,
    validator: SignatureValidator,
}

impl Reconciler {
    pub fn new(
        class: ObjectClass,
        objects: ObjectStore,
        statuses: StatusStore,
        validator: SignatureValidator,
    ) -> Self {
        Self {
            class,
            objects,
            statuses,
            validator,
        }
    }

    pub fn class(&self) -> ObjectClass {
        self.class
    }

    pub fn statuses(&self) -> &StatusStore {
        &self.statuses
    }

    /// Resolve a delivery-side change against the Status on disk and run
    /// the resulting operation.
    pub fn apply(&self, change: ConfigChange) -> Result<(), FatalError> {
        match self.resolve(change)? {
            Some(event) => self.dispatch(event),
            None => Ok(()),
        }
    }

    /// Turn a change into an operation. `None` means nothing to do.
    ///
    /// An undecodable Status is treated as absent: a present config
    /// overwrites it through Create, an absent one removes it.
    pub fn resolve(&self, change: ConfigChange) -> Result<Option<ConfigEvent>, FatalError> {
        let existing = self.load_status(change.status_path())?;
        let event = match (change, existing) {
            (ConfigChange::Present { status_path, config }, None) => {
                Some(ConfigEvent::Create { status_path, config })
            }
            (ConfigChange::Present { status_path, config }, Some(status)) => {
                Some(ConfigEvent::Modify {
                    status_path,
                    config,
                    status,
                })
            }
            (ConfigChange::Absent { status_path }, Some(status)) => {
                Some(ConfigEvent::Delete { status_path, status })
            }
            (ConfigChange::Absent { status_path }, None) => {
                if self.statuses.remove(&status_path)? {
                    tracing::warn!(class = %self.class, path = %status_path.display(), "removed undecodable status");
                } else {
                    tracing::debug!(class = %self.class, path = %status_path.display(), "delete for unknown object");
                }
                None
            }
        };
        Ok(event)
    }

    fn load_status(&self, path: &Path) -> Result<Option<VerifyStatus>, FatalError> {
        match self.statuses.read(path) {
            Ok(status) => Ok(status),
            Err(err @ StatusError::Decode { .. }) => {
                tracing::warn!(class = %self.class, error = %err, "ignoring undecodable status");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn dispatch(&self, event: ConfigEvent) -> Result<(), FatalError> {
        tracing::debug!(class = %self.class, kind = event.kind(), "dispatching");
        match event {
            ConfigEvent::Create {
                status_path,
                config,
            } => self.create(&status_path, &config).map(drop),
            ConfigEvent::Modify {
                status_path,
                config,
                status,
            } => self.modify(&status_path, &config, status).map(drop),
            ConfigEvent::Delete {
                status_path,
                status,
            } => self.delete(&status_path, &status),
        }
    }

    /// Verify and deliver a newly configured object. Returns the final
    /// Status as written.
    pub fn create(&self, status_path: &Path, config: &VerifyConfig) -> Result<VerifyStatus, FatalError> {
        let class = self.class;
        let safename = config.safename.as_str();
        let digest = config.claimed_digest.as_str();
        tracing::info!(%class, safename, digest, url = %config.download_url, "create");

        let mut status = VerifyStatus::for_create(config);
        self.statuses.write(status_path, &status)?;

        let verifying = match self.objects.promote_to_verifying(class, digest, safename) {
            Ok(path) => path,
            Err(err) if err.is_recoverable() => {
                self.fail(status_path, &mut status, err.to_string())?;
                return Ok(status);
            }
            Err(err) => return Err(err.into()),
        };

        if let Err(err) = self.check(&verifying, config) {
            self.fail(status_path, &mut status, err.to_string())?;
            return Ok(status);
        }

        match self.objects.promote_to_verified(class, digest, safename) {
            Ok(_) => {}
            Err(err) if err.is_recoverable() => {
                self.fail(status_path, &mut status, err.to_string())?;
                return Ok(status);
            }
            Err(err) => return Err(err.into()),
        }
        status.mark_delivered();
        self.statuses.write(status_path, &status)?;
        tracing::info!(%class, safename, "delivered");
        Ok(status)
    }

    /// Apply a rewritten config to an existing object. Returns the Status
    /// as it stands afterwards.
    pub fn modify(
        &self,
        status_path: &Path,
        config: &VerifyConfig,
        mut status: VerifyStatus,
    ) -> Result<VerifyStatus, FatalError> {
        let class = self.class;

        if config.ref_count == 0 {
            tracing::info!(%class, safename = %status.safename, "ref_count dropped to zero");
            status.ref_count = 0;
            status.pending_modify = true;
            self.statuses.write(status_path, &status)?;
            self.remove_content(&status)?;
            status.state = VerifyState::Initial;
            status.pending_modify = false;
            self.statuses.write(status_path, &status)?;
            return Ok(status);
        }

        if status.same_identity(config) {
            tracing::debug!(%class, safename = %status.safename, ref_count = config.ref_count, "modify without content change");
            // The record on disk is left as is.
            status.ref_count = config.ref_count;
            return Ok(status);
        }

        tracing::info!(
            %class,
            old = %status.safename,
            new = %config.safename,
            digest = %config.claimed_digest,
            "content changed; replacing object"
        );
        status.ref_count = config.ref_count;
        status.pending_modify = true;
        self.statuses.write(status_path, &status)?;
        self.remove_content(&status)?;
        // Create writes a fresh record, which clears pending_modify.
        self.create(status_path, config)
    }

    /// Remove an object and its Status.
    pub fn delete(&self, status_path: &Path, status: &VerifyStatus) -> Result<(), FatalError> {
        tracing::info!(class = %self.class, safename = %status.safename, "delete");
        self.remove_content(status)?;
        if !self.statuses.remove(status_path)? {
            tracing::warn!(class = %self.class, path = %status_path.display(), "status already removed");
        }
        Ok(())
    }

    fn remove_content(&self, status: &VerifyStatus) -> Result<(), FatalError> {
        let delivered = status.state == VerifyState::Delivered;
        match self
            .objects
            .remove_object(self.class, &status.claimed_digest, delivered)
        {
            Ok(()) => Ok(()),
            // Such an object never entered the store.
            Err(err) if err.is_recoverable() => {
                tracing::warn!(class = %self.class, safename = %status.safename, error = %err, "no content to remove");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn check(&self, path: &Path, config: &VerifyConfig) -> Result<(), CryptoError> {
        let digest = verify_file_digest(path, &config.claimed_digest)?;
        self.validator.verify(&digest, config)
    }

    fn fail(&self, status_path: &Path, status: &mut VerifyStatus, error: String) -> Result<(), FatalError> {
        tracing::warn!(class = %self.class, safename = %status.safename, %error, "verification failed");
        status.record_error(error);
        self.statuses.write(status_path, status)?;
        Ok(())
    }

    /// The status path a config key maps to.
    pub fn status_path(&self, key: &str) -> PathBuf {
        self.statuses.path_for(self.class, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use verifier_crypto::TrustConfig;
    use verifier_store::Stage;

    const CONTENT: &[u8] = b"hello world";
    const DIGEST: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    struct Harness {
        _dir: tempfile::TempDir,
        reconciler: Reconciler,
        objects: ObjectStore,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let objects = ObjectStore::new(dir.path().join("objects"), dir.path().join("preserve"));
        objects.prepare().unwrap();
        let statuses = StatusStore::new(dir.path().join("status"));
        statuses.prepare().unwrap();
        let validator = SignatureValidator::new(TrustConfig {
            root_certificate: dir.path().join("root.pem"),
            certificate_dir: dir.path().join("certs"),
        });
        let reconciler = Reconciler::new(ObjectClass::AppImg, objects.clone(), statuses, validator);
        Harness {
            _dir: dir,
            reconciler,
            objects,
        }
    }

    fn config(ref_count: u32) -> VerifyConfig {
        VerifyConfig {
            safename: format!("hello.txt.{DIGEST}"),
            download_url: "https://images.example.com/hello.txt".into(),
            claimed_digest: DIGEST.into(),
            ref_count,
            signature: None,
            signer_cert_url: None,
            cert_chain_urls: Vec::new(),
        }
    }

    impl Harness {
        fn download(&self, config: &VerifyConfig, content: &[u8]) {
            let dir = self.objects.layout().digest_dir(
                ObjectClass::AppImg,
                Stage::Pending,
                &config.claimed_digest,
            );
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(&config.safename), content).unwrap();
        }

        fn status_path(&self, config: &VerifyConfig) -> PathBuf {
            self.reconciler.status_path(&config.safename)
        }
    }

    #[test]
    fn resolve_maps_presence_against_disk() {
        let h = harness();
        let cfg = config(1);
        let path = h.status_path(&cfg);

        let event = h
            .reconciler
            .resolve(ConfigChange::Present {
                status_path: path.clone(),
                config: cfg.clone(),
            })
            .unwrap();
        assert_eq!(event.as_ref().map(ConfigEvent::kind), Some("create"));

        h.download(&cfg, CONTENT);
        h.reconciler.create(&path, &cfg).unwrap();

        let event = h
            .reconciler
            .resolve(ConfigChange::Present {
                status_path: path.clone(),
                config: cfg,
            })
            .unwrap();
        assert_eq!(event.as_ref().map(ConfigEvent::kind), Some("modify"));

        let event = h
            .reconciler
            .resolve(ConfigChange::Absent {
                status_path: path.clone(),
            })
            .unwrap();
        assert_eq!(event.as_ref().map(ConfigEvent::kind), Some("delete"));
    }

    #[test]
    fn absent_without_status_is_ignored() {
        let h = harness();
        let path = h.reconciler.status_path("nothing");
        assert!(h
            .reconciler
            .resolve(ConfigChange::Absent { status_path: path })
            .unwrap()
            .is_none());
    }

    #[test]
    fn undecodable_status_is_recreated() {
        let h = harness();
        let cfg = config(1);
        let path = h.status_path(&cfg);
        fs::write(&path, b"garbage").unwrap();
        h.download(&cfg, CONTENT);

        h.reconciler
            .apply(ConfigChange::Present {
                status_path: path.clone(),
                config: cfg,
            })
            .unwrap();

        let status = h.reconciler.statuses().read(&path).unwrap().unwrap();
        assert_eq!(status.state, VerifyState::Delivered);
    }

    #[test]
    fn create_without_download_records_error() {
        let h = harness();
        let cfg = config(1);
        let status = h.reconciler.create(&h.status_path(&cfg), &cfg).unwrap();
        assert_eq!(status.state, VerifyState::Initial);
        assert!(status.last_error.contains("pending object"));
        assert!(!status.pending_add);
    }

    #[test]
    fn create_onto_existing_verifying_file_is_fatal() {
        let h = harness();
        let cfg = config(1);
        h.download(&cfg, CONTENT);
        h.objects
            .promote_to_verifying(ObjectClass::AppImg, DIGEST, &cfg.safename)
            .unwrap();
        h.download(&cfg, CONTENT);

        let err = h.reconciler.create(&h.status_path(&cfg), &cfg).unwrap_err();
        assert!(matches!(err, FatalError::Store(_)));
    }

    #[test]
    fn modify_ref_count_change_alone_writes_nothing() {
        let h = harness();
        let cfg = config(1);
        let path = h.status_path(&cfg);
        h.download(&cfg, CONTENT);
        let before = h.reconciler.create(&path, &cfg).unwrap();

        let after = h.reconciler.modify(&path, &config(5), before.clone()).unwrap();

        assert_eq!(after.ref_count, 5);
        assert_eq!(
            VerifyStatus {
                ref_count: before.ref_count,
                ..after
            },
            before
        );
        assert_eq!(h.reconciler.statuses().read(&path).unwrap(), Some(before));
    }

    #[test]
    fn delete_removes_status_and_content() {
        let h = harness();
        let cfg = config(1);
        let path = h.status_path(&cfg);
        h.download(&cfg, CONTENT);
        let status = h.reconciler.create(&path, &cfg).unwrap();

        h.reconciler.delete(&path, &status).unwrap();

        assert!(!path.exists());
        assert!(h.objects.scan_verified(ObjectClass::AppImg).unwrap().is_empty());
        h.reconciler.delete(&path, &status).unwrap();
    }
}
