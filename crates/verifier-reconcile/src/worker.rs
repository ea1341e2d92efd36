//! Per-class event workers.
//!
//! Each object class gets one unbounded queue and one consumer. The
//! consumer runs on a blocking thread because every controller operation
//! is synchronous filesystem and crypto work. Changes are applied strictly
//! in arrival order; the first fatal error stops the worker.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use verifier_core::ObjectClass;

use crate::controller::Reconciler;
use crate::error::FatalError;
use crate::event::ConfigChange;

/// The sending half of a class queue.
pub type ChangeSender = mpsc::UnboundedSender<ConfigChange>;

/// A running class worker.
#[derive(Debug)]
pub struct ClassWorker {
    class: ObjectClass,
    sender: ChangeSender,
    handle: JoinHandle<Result<(), FatalError>>,
}

impl ClassWorker {
    /// Start a worker owning `reconciler`. Must be called inside a Tokio
    /// runtime.
    pub fn spawn(reconciler: Reconciler) -> Self {
        let class = reconciler.class();
        let (sender, mut receiver) = mpsc::unbounded_channel::<ConfigChange>();
        let handle = tokio::task::spawn_blocking(move || {
            tracing::info!(%class, "worker started");
            while let Some(change) = receiver.blocking_recv() {
                if let Err(err) = reconciler.apply(change) {
                    tracing::error!(%class, error = %err, "fatal error; stopping worker");
                    return Err(err);
                }
            }
            tracing::info!(%class, "queue closed; worker exiting");
            Ok(())
        });
        Self {
            class,
            sender,
            handle,
        }
    }

    pub fn class(&self) -> ObjectClass {
        self.class
    }

    /// A handle for enqueuing changes.
    pub fn sender(&self) -> ChangeSender {
        self.sender.clone()
    }

    /// Close this worker's own sender and wait for the queue to drain.
    ///
    /// The worker only exits once every cloned sender is dropped too.
    pub async fn join(self) -> Result<(), FatalError> {
        let Self {
            class,
            sender,
            handle,
        } = self;
        drop(sender);
        match handle.await {
            Ok(result) => result,
            Err(err) => Err(FatalError::WorkerLost {
                class,
                reason: err.to_string(),
            }),
        }
    }
}
