//! Lifecycle properties of the reconciler, exercised end to end against a
//! temporary object root, status root and trust directory.

use std::fs;
use std::path::{Path, PathBuf};

use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use verifier_core::{ObjectClass, VerifyConfig, VerifyState, VerifyStatus};
use verifier_crypto::{SignatureValidator, TrustConfig};
use verifier_reconcile::{recover, ConfigChange, Reconciler};
use verifier_store::{ObjectStore, Stage, StatusStore};

const CLASS: ObjectClass = ObjectClass::BaseOs;
const CERT_URL: &str = "https://certs.example.com/v1";

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../verifier-crypto/tests/fixtures")
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

struct Env {
    _dir: TempDir,
    objects: ObjectStore,
    statuses: StatusStore,
    reconciler: Reconciler,
}

impl Env {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let objects = ObjectStore::new(dir.path().join("downloads"), dir.path().join("config/preserve"));
        objects.prepare().unwrap();
        let statuses = StatusStore::new(dir.path().join("run"));
        statuses.prepare().unwrap();

        let certs = dir.path().join("certs");
        fs::create_dir(&certs).unwrap();
        for name in ["intermediate.pem", "rsa-signer.pem"] {
            fs::copy(fixtures().join(name), certs.join(name)).unwrap();
        }
        let root_certificate = dir.path().join("root-certificate.pem");
        fs::copy(fixtures().join("root-certificate.pem"), &root_certificate).unwrap();

        let validator = SignatureValidator::new(TrustConfig {
            root_certificate,
            certificate_dir: certs,
        });
        let reconciler = Reconciler::new(CLASS, objects.clone(), statuses.clone(), validator);
        Self {
            _dir: dir,
            objects,
            statuses,
            reconciler,
        }
    }

    /// Place downloaded bytes in `pending` and return a matching config.
    fn download(&self, filename: &str, content: &[u8]) -> VerifyConfig {
        let digest = hex(&Sha256::digest(content));
        let config = VerifyConfig {
            safename: format!("{filename}.{digest}"),
            download_url: format!("https://images.example.com/{filename}"),
            claimed_digest: digest,
            ref_count: 1,
            signature: None,
            signer_cert_url: None,
            cert_chain_urls: Vec::new(),
        };
        self.put_pending(&config, content);
        config
    }

    fn put_pending(&self, config: &VerifyConfig, content: &[u8]) {
        let dir = self
            .objects
            .layout()
            .digest_dir(CLASS, Stage::Pending, &config.claimed_digest);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(&config.safename), content).unwrap();
    }

    fn present(&self, config: &VerifyConfig) {
        self.reconciler
            .apply(ConfigChange::Present {
                status_path: self.status_path(config),
                config: config.clone(),
            })
            .unwrap();
    }

    fn status_path(&self, config: &VerifyConfig) -> PathBuf {
        self.statuses.path_for(CLASS, &config.safename)
    }

    fn status(&self, config: &VerifyConfig) -> VerifyStatus {
        self.statuses.read(&self.status_path(config)).unwrap().unwrap()
    }

    fn stage_is_empty(&self, stage: Stage) -> bool {
        fs::read_dir(self.objects.layout().stage_root(CLASS, stage))
            .unwrap()
            .next()
            .is_none()
    }

    fn all_statuses(&self) -> Vec<(PathBuf, VerifyStatus)> {
        self.statuses
            .list(CLASS)
            .unwrap()
            .into_iter()
            .map(|p| {
                let s = self.statuses.read(&p).unwrap().unwrap();
                (p, s)
            })
            .collect()
    }
}

fn sign_rsa(config: &mut VerifyConfig) {
    let pem = fs::read_to_string(fixtures().join("rsa-signer-key.pem")).unwrap();
    let key = RsaPrivateKey::from_pkcs8_pem(&pem).unwrap();
    let digest: Vec<u8> = (0..config.claimed_digest.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&config.claimed_digest[i..i + 2], 16).unwrap())
        .collect();
    config.signature = Some(key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest).unwrap());
    config.signer_cert_url = Some(format!("{CERT_URL}/rsa-signer.pem"));
    config.cert_chain_urls = vec![format!("{CERT_URL}/intermediate.pem")];
}

#[test]
fn correct_digest_without_signature_is_delivered() {
    let env = Env::new();
    let config = env.download("rootfs.img", b"base os image");

    env.present(&config);

    let status = env.status(&config);
    assert_eq!(status.state, VerifyState::Delivered);
    assert!(!status.pending_add);
    assert!(status.last_error.is_empty());

    let verified = env.objects.scan_verified(CLASS).unwrap();
    assert_eq!(verified.len(), 1);
    assert_eq!(verified[0].digest, config.claimed_digest);
    assert_eq!(verified[0].filename, "rootfs.img");
    assert_eq!(fs::read(&verified[0].path).unwrap(), b"base os image");
    assert!(env.stage_is_empty(Stage::Pending));
    assert!(env.stage_is_empty(Stage::Verifying));
}

#[test]
fn wrong_digest_is_rejected_with_both_values() {
    let env = Env::new();
    let mut config = env.download("rootfs.img", b"base os image");
    let actual = config.claimed_digest.clone();
    let claimed = hex(&Sha256::digest(b"something else"));
    // Re-home the download under the digest the config claims.
    fs::remove_dir_all(env.objects.layout().digest_dir(CLASS, Stage::Pending, &actual)).unwrap();
    config.claimed_digest = claimed.clone();
    config.safename = format!("rootfs.img.{claimed}");
    env.put_pending(&config, b"base os image");

    env.present(&config);

    let status = env.status(&config);
    assert_eq!(status.state, VerifyState::Initial);
    assert!(status.last_error.contains(&format!("computed {actual}")));
    assert!(status.last_error.contains(&format!("configured {claimed}")));
    assert!(status.last_error_time.is_some());
    assert!(env.stage_is_empty(Stage::Verified));
}

#[test]
fn identical_modify_is_a_noop() {
    let env = Env::new();
    let config = env.download("app.img", b"app");
    env.present(&config);
    let path = env.status_path(&config);
    let before = fs::read(&path).unwrap();
    let modified = fs::metadata(&path).unwrap().modified().unwrap();

    env.present(&config);

    assert_eq!(fs::read(&path).unwrap(), before);
    assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), modified);
    assert_eq!(env.objects.scan_verified(CLASS).unwrap().len(), 1);
}

#[test]
fn zero_ref_count_removes_verified_content() {
    let env = Env::new();
    let config = env.download("app.img", b"app");
    env.present(&config);

    env.present(&VerifyConfig {
        ref_count: 0,
        ..config.clone()
    });

    let status = env.status(&config);
    assert_eq!(status.state, VerifyState::Initial);
    assert!(!status.pending_modify);
    assert_eq!(status.ref_count, 0);
    assert!(env.objects.scan_verified(CLASS).unwrap().is_empty());
}

#[test]
fn zero_ref_count_keeps_content_when_preserved() {
    let env = Env::new();
    let config = env.download("app.img", b"app");
    env.present(&config);
    let sentinel = env.objects.preserve_sentinel().to_path_buf();
    fs::create_dir_all(sentinel.parent().unwrap()).unwrap();
    fs::write(&sentinel, b"").unwrap();

    env.present(&VerifyConfig {
        ref_count: 0,
        ..config.clone()
    });

    assert_eq!(env.status(&config).state, VerifyState::Initial);
    assert_eq!(env.objects.scan_verified(CLASS).unwrap().len(), 1);
}

#[test]
fn changed_content_replaces_object() {
    let env = Env::new();
    let old = env.download("app.img", b"v1");
    env.present(&old);
    let path = env.status_path(&old);

    let new = env.download("app.img", b"v2");
    env.reconciler
        .apply(ConfigChange::Present {
            status_path: path.clone(),
            config: new.clone(),
        })
        .unwrap();

    let status = env.statuses.read(&path).unwrap().unwrap();
    assert_eq!(status.state, VerifyState::Delivered);
    assert_eq!(status.claimed_digest, new.claimed_digest);
    assert!(!status.pending_modify);
    let verified = env.objects.scan_verified(CLASS).unwrap();
    assert_eq!(verified.len(), 1);
    assert_eq!(verified[0].digest, new.claimed_digest);
}

#[test]
fn same_digest_under_two_names_keeps_one_directory() {
    let env = Env::new();
    let first = env.download("first.img", b"shared bytes");
    env.present(&first);
    let second = env.download("second.img", b"shared bytes");
    env.present(&second);

    assert_eq!(env.status(&second).state, VerifyState::Delivered);
    let verified = env.objects.scan_verified(CLASS).unwrap();
    assert_eq!(verified.len(), 1);
    assert_eq!(verified[0].filename, "second.img");
}

#[test]
fn delete_removes_everything() {
    let env = Env::new();
    let config = env.download("app.img", b"app");
    env.present(&config);

    env.reconciler
        .apply(ConfigChange::Absent {
            status_path: env.status_path(&config),
        })
        .unwrap();

    assert!(!env.status_path(&config).exists());
    assert!(env.stage_is_empty(Stage::Verified));
}

#[test]
fn rsa_signed_artifact_is_delivered() {
    let env = Env::new();
    let mut config = env.download("signed.img", b"signed base os");
    sign_rsa(&mut config);

    env.present(&config);

    let status = env.status(&config);
    assert_eq!(status.state, VerifyState::Delivered, "{}", status.last_error);
}

#[test]
fn corrupted_signature_byte_leaves_object_unverified() {
    let env = Env::new();
    let mut config = env.download("signed.img", b"signed base os");
    sign_rsa(&mut config);
    if let Some(sig) = config.signature.as_mut() {
        sig[0] ^= 0x80;
    }

    env.present(&config);

    let status = env.status(&config);
    assert_eq!(status.state, VerifyState::Initial);
    assert!(status.last_error.contains("signature verification failed"));
    assert!(env.stage_is_empty(Stage::Verified));
}

#[test]
fn recovery_is_idempotent() {
    let env = Env::new();
    let delivered = env.download("keep.img", b"keep");
    env.present(&delivered);
    let retried = env.download("retry.img", b"retry");
    env.present(&VerifyConfig {
        claimed_digest: hex(&Sha256::digest(b"other")),
        safename: "retry.img.deadbeef".into(),
        ..retried.clone()
    });
    env.present(&retried);
    // Leave a half-finished download behind.
    env.download("partial.img", b"partial");

    recover(&env.objects, &env.statuses).unwrap();
    let first = env.all_statuses();
    recover(&env.objects, &env.statuses).unwrap();
    let second = env.all_statuses();

    assert_eq!(first, second);
    assert!(second.iter().all(|(_, s)| !s.pending_delete));
    assert!(second.iter().all(|(_, s)| s.state == VerifyState::Delivered));
    assert_eq!(second.len(), 2);
    assert!(env.stage_is_empty(Stage::Pending));
}

fn config_with_digest(safename: &str, digest: &str) -> VerifyConfig {
    VerifyConfig {
        safename: safename.into(),
        download_url: "https://images.example.com/bogus.img".into(),
        claimed_digest: digest.into(),
        ref_count: 1,
        signature: None,
        signer_cert_url: None,
        cert_chain_urls: Vec::new(),
    }
}

#[test]
fn absolute_digest_cannot_reach_outside_the_store() {
    let env = Env::new();
    let outside = env._dir.path().join("outside");
    fs::create_dir_all(&outside).unwrap();
    fs::write(outside.join("bogus.img.x"), b"not ours").unwrap();
    let config = config_with_digest("bogus.img.x", &outside.to_string_lossy());

    env.present(&config);

    let status = env.status(&config);
    assert_eq!(status.state, VerifyState::Initial);
    assert!(status.last_error.contains("invalid digest"), "{}", status.last_error);

    env.reconciler
        .apply(ConfigChange::Absent {
            status_path: env.status_path(&config),
        })
        .unwrap();

    assert!(!env.status_path(&config).exists());
    assert_eq!(fs::read(outside.join("bogus.img.x")).unwrap(), b"not ours");
}

#[test]
fn parent_dir_digest_cannot_remove_other_objects() {
    let env = Env::new();
    let delivered = env.download("keep.img", b"keep");
    env.present(&delivered);
    let bogus = config_with_digest("bogus.img.x", "..");

    env.present(&bogus);
    assert_eq!(env.status(&bogus).state, VerifyState::Initial);
    env.reconciler
        .apply(ConfigChange::Absent {
            status_path: env.status_path(&bogus),
        })
        .unwrap();

    assert_eq!(env.objects.scan_verified(CLASS).unwrap().len(), 1);
    assert_eq!(env.status(&delivered).state, VerifyState::Delivered);
    for stage in Stage::ALL {
        assert!(env.objects.layout().stage_root(CLASS, stage).is_dir());
    }
}
