//! Daemon startup and supervision.
//!
//! Startup order: directories, crash recovery, then one worker and one
//! poller per object class. Each class's `restarted` marker is withdrawn
//! before recovery and set again after it. The daemon runs until a worker stops (always
//! an error) or the process receives Ctrl-C.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tokio::task::JoinSet;
use verifier_core::ObjectClass;
use verifier_crypto::SignatureValidator;
use verifier_reconcile::{recover, ClassWorker, RecoveryReport, Reconciler};
use verifier_store::{ObjectStore, StatusStore};

use crate::config::DaemonConfig;
use crate::watch::ConfigPoller;

/// Create every directory the daemon reads from or writes to.
pub fn prepare_directories(config: &DaemonConfig) -> Result<(ObjectStore, StatusStore)> {
    create_dir(&config.certificate_dir)?;
    for class in ObjectClass::ALL {
        create_dir(&config.config_dir(class))?;
    }

    let statuses = StatusStore::new(&config.status_root);
    statuses.prepare().context("creating status directories")?;
    let objects = ObjectStore::new(&config.object_root, config.preserve_sentinel());
    objects.prepare().context("creating object store")?;
    Ok((objects, statuses))
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).with_context(|| format!("creating directory: {}", path.display()))
}

/// Prepare directories and run crash recovery, bracketed by the restart
/// signal.
pub fn startup(config: &DaemonConfig) -> Result<(ObjectStore, StatusStore, RecoveryReport)> {
    let (objects, statuses) = prepare_directories(config)?;
    for class in ObjectClass::ALL {
        statuses
            .clear_restarted(class)
            .with_context(|| format!("clearing {class} restart signal"))?;
    }
    let report = recover(&objects, &statuses).context("crash recovery failed")?;
    for class in ObjectClass::ALL {
        statuses
            .signal_restarted(class)
            .with_context(|| format!("signalling {class} restart"))?;
    }
    Ok((objects, statuses, report))
}

/// Run the daemon until a fatal error or Ctrl-C.
pub async fn run_daemon(config: DaemonConfig) -> Result<()> {
    let (objects, statuses, _report) = startup(&config)?;
    let validator = SignatureValidator::new(config.trust());

    let mut workers = JoinSet::new();
    let mut pollers = JoinSet::new();
    for class in ObjectClass::ALL {
        let reconciler = Reconciler::new(class, objects.clone(), statuses.clone(), validator.clone());
        let worker = ClassWorker::spawn(reconciler);
        let poller = ConfigPoller::new(class, config.config_dir(class), statuses.clone());
        pollers.spawn(poller.run(worker.sender(), config.poll_interval()));
        workers.spawn(async move { (class, worker.join().await) });
    }
    tracing::info!(
        object_root = %config.object_root.display(),
        status_root = %config.status_root.display(),
        config_root = %config.config_root.display(),
        "verifier running"
    );

    let outcome = tokio::select! {
        Some(joined) = workers.join_next() => match joined {
            Ok((class, Ok(()))) => Err(anyhow!("{class} worker exited unexpectedly")),
            Ok((class, Err(err))) => Err(anyhow::Error::new(err).context(format!("{class} worker failed"))),
            Err(err) => Err(anyhow!("worker task failed: {err}")),
        },
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for shutdown signal")?;
            tracing::info!("shutdown requested");
            Ok(())
        }
    };

    pollers.abort_all();
    outcome
}
