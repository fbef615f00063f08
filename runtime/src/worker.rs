//! Reconciler workers.
//!
//! A [`ReconcilerWorker`] owns one subscription to the listings topic and
//! processes one delivery at a time: reconcile, then settle with the
//! acknowledgement the reconciler chose. A [`ReconcilerPool`] runs several
//! workers against the same bus; their subscriptions share one consumer group,
//! so partitions are spread across workers and each partition keeps its order.
//!
//! # Example
//!
//! ```ignore
//! let pool = ReconcilerPool::spawn(4, reconciler, event_bus, "listings");
//!
//! tokio::signal::ctrl_c().await?;
//! let processed = pool.shutdown().await?;
//! ```

use crate::reconciler::Reconciler;
use futures::StreamExt;
use listings_core::event_bus::{EventBus, EventBusError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Pause after a transport error before polling the bus again.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Errors that stop a worker.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The worker could not subscribe to its topic
    #[error("Failed to subscribe: {0}")]
    Subscribe(#[from] EventBusError),

    /// The worker task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Join(String),
}

/// Consumes the listings topic and reconciles each delivery.
pub struct ReconcilerWorker {
    id: usize,
    reconciler: Arc<Reconciler>,
    event_bus: Arc<dyn EventBus>,
    topic: String,
    shutdown: watch::Receiver<bool>,
    error_backoff: Duration,
}

impl ReconcilerWorker {
    /// Create a worker.
    ///
    /// The worker stops once `true` is sent on the shutdown channel or the
    /// sender is dropped.
    #[must_use]
    pub fn new(
        id: usize,
        reconciler: Arc<Reconciler>,
        event_bus: Arc<dyn EventBus>,
        topic: impl Into<String>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            reconciler,
            event_bus,
            topic: topic.into(),
            shutdown,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    /// Override the pause after a transport error.
    #[must_use]
    pub const fn with_error_backoff(mut self, error_backoff: Duration) -> Self {
        self.error_backoff = error_backoff;
        self
    }

    /// Process deliveries until shutdown or until the stream ends.
    ///
    /// Returns the number of deliveries processed. A delivery in flight when
    /// shutdown is signalled is finished and settled first.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Subscribe`] if the subscription cannot be created.
    pub async fn run(mut self) -> Result<u64, WorkerError> {
        tracing::info!(worker = self.id, topic = %self.topic, "Starting reconciler worker");

        let mut deliveries = self.event_bus.subscribe(&[self.topic.as_str()]).await?;
        let mut processed = 0u64;

        while !*self.shutdown.borrow() {
            tokio::select! {
                next = deliveries.next() => {
                    match next {
                        Some(Ok(delivery)) => {
                            tracing::debug!(
                                worker = self.id,
                                key = ?delivery.key(),
                                attempt = delivery.attempt(),
                                "Received change event"
                            );
                            let reconciliation = self.reconciler.reconcile(delivery.payload()).await;
                            let acknowledgement = self.reconciler.acknowledgement(&reconciliation);
                            tracing::debug!(
                                worker = self.id,
                                outcome = reconciliation.outcome(),
                                acknowledgement = ?acknowledgement,
                                "Settling change event"
                            );
                            delivery.settle(acknowledgement);
                            processed += 1;
                        }
                        Some(Err(e)) => {
                            // Transport errors are transient; the bus reconnects.
                            tracing::error!(worker = self.id, error = %e, "Error receiving change event");
                            tokio::time::sleep(self.error_backoff).await;
                        }
                        None => {
                            tracing::info!(worker = self.id, "Delivery stream ended");
                            break;
                        }
                    }
                }

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        tracing::info!(worker = self.id, "Shutdown signal received");
                        break;
                    }
                }
            }
        }

        tracing::info!(worker = self.id, processed, "Reconciler worker stopped");
        Ok(processed)
    }
}

/// A group of reconciler workers sharing one shutdown signal.
pub struct ReconcilerPool {
    handles: Vec<JoinHandle<Result<u64, WorkerError>>>,
    shutdown: watch::Sender<bool>,
}

impl ReconcilerPool {
    /// Spawn `workers` workers (at least one) on the current Tokio runtime.
    #[must_use]
    pub fn spawn(
        workers: usize,
        reconciler: Arc<Reconciler>,
        event_bus: Arc<dyn EventBus>,
        topic: impl Into<String>,
    ) -> Self {
        let topic = topic.into();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let handles = (0..workers.max(1))
            .map(|id| {
                let worker = ReconcilerWorker::new(
                    id,
                    Arc::clone(&reconciler),
                    Arc::clone(&event_bus),
                    topic.clone(),
                    shutdown_rx.clone(),
                );
                tokio::spawn(worker.run())
            })
            .collect::<Vec<_>>();

        tracing::info!(workers = handles.len(), topic = %topic, "Reconciler pool started");
        Self { handles, shutdown }
    }

    /// Number of workers in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the pool has no workers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every worker to stop and wait for them.
    ///
    /// Returns the total number of deliveries processed.
    ///
    /// # Errors
    ///
    /// Returns the first [`WorkerError`] reported by a worker; the remaining
    /// workers are still awaited.
    pub async fn shutdown(self) -> Result<u64, WorkerError> {
        // Receivers may already be gone if every worker exited on its own.
        let _ = self.shutdown.send(true);

        let mut total = 0;
        let mut first_error = None;
        for handle in self.handles {
            match handle.await {
                Ok(Ok(processed)) => total += processed,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Reconciler worker failed");
                    first_error.get_or_insert(e);
                },
                Err(e) => {
                    first_error.get_or_insert(WorkerError::Join(e.to_string()));
                },
            }
        }

        tracing::info!(processed = total, "Reconciler pool stopped");
        first_error.map_or(Ok(total), Err)
    }
}
