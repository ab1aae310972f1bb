//! Worker Pool (C7): a fixed number of concurrent loops pulling from the
//! Queue and running each document through the Processor under a deadline,
//! plus two background tasks (heartbeat, stale-job recovery) (§4.7).
//!
//! Grounded on the teacher's `tokio::select!`-based graceful-shutdown idiom
//! (a `watch` channel broadcasting the shutdown signal, checked at every
//! suspension point) generalized from a single HTTP server loop to N worker
//! loops plus the two background tasks.

pub mod http;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::document::{DocumentStore, Origin, ProcessingStage, StoreError};
use crate::events::{EventBus, Topic};
use crate::processor::Processor;
use crate::queue::{Queue, QueueConfig, QueueError};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

/// How long a worker waits for in-flight jobs to finish after a shutdown
/// signal before marking them failed-with-retry and exiting anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
/// Upper bound on the idle-poll sleep when a dequeue comes back empty.
const EMPTY_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Margin subtracted from `processing_timeout` so a worker can mark a job
/// failed itself before stale-recovery would otherwise re-enqueue it.
const DEADLINE_MARGIN: Duration = Duration::from_secs(5);

pub struct WorkerPoolConfig {
    pub max_concurrent_workers: usize,
    pub processing_timeout: Duration,
    pub stale_job_check_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl From<&QueueConfig> for WorkerPoolConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_concurrent_workers: config.max_concurrent_workers,
            processing_timeout: Duration::from_secs(config.processing_timeout_secs),
            stale_job_check_interval: Duration::from_secs(config.stale_job_check_interval_secs),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
        }
    }
}

pub struct WorkerPool {
    queue: Arc<dyn Queue>,
    store: Arc<dyn DocumentStore>,
    processor: Arc<Processor>,
    events: Arc<EventBus>,
    config: WorkerPoolConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn Queue>,
        store: Arc<dyn DocumentStore>,
        processor: Arc<Processor>,
        events: Arc<EventBus>,
        config: WorkerPoolConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self { queue, store, processor, events, config, shutdown_tx, shutdown_rx }
    }

    /// Spawns `max_concurrent_workers` worker loops plus the heartbeat and
    /// stale-recovery background tasks. Returns when all of them have exited,
    /// which only happens after `shutdown()` is called.
    pub async fn run(self: Arc<Self>) {
        let mut handles = Vec::new();

        for n in 0..self.config.max_concurrent_workers {
            let worker_id = format!("worker-{}-{n}", Uuid::new_v4());

            let pool = Arc::clone(&self);
            let id = worker_id.clone();
            handles.push(tokio::spawn(async move { pool.worker_loop(id).await }));

            let pool = Arc::clone(&self);
            handles.push(tokio::spawn(async move { pool.heartbeat_loop(worker_id).await }));
        }

        {
            let pool = Arc::clone(&self);
            handles.push(tokio::spawn(async move { pool.stale_recovery_loop().await }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker pool task panicked");
            }
        }
    }

    /// Signals every loop to stop accepting new work. In-flight jobs get
    /// `SHUTDOWN_GRACE` to finish before `run()` returns.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    async fn worker_loop(&self, worker_id: String) {
        info!(worker_id, "worker started");
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            if self.is_shutting_down() {
                break;
            }

            let batch = match self.queue.dequeue(&worker_id, 1).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(worker_id, error = %e, "dequeue failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(EMPTY_POLL_INTERVAL) => {}
                        _ = shutdown_rx.changed() => break,
                    }
                    continue;
                }
            };

            let Some(doc) = batch.into_iter().next() else {
                tokio::select! {
                    _ = tokio::time::sleep(EMPTY_POLL_INTERVAL) => {}
                    _ = shutdown_rx.changed() => break,
                }
                continue;
            };

            self.run_one(&worker_id, doc).await;
        }

        info!(worker_id, "worker stopping, waiting out shutdown grace period");
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        info!(worker_id, "worker stopped");
    }

    async fn run_one(&self, worker_id: &str, doc: crate::document::Document) {
        let id = doc.id.clone();
        let temp_path = match &doc.origin {
            Origin::Upload(path) => Some(path.clone()),
            _ => None,
        };

        let deadline = self.config.processing_timeout.saturating_sub(DEADLINE_MARGIN);
        let outcome = tokio::time::timeout(deadline, self.processor.process(doc)).await;

        match outcome {
            Ok(Ok(_)) => {
                if let Err(e) = self.queue.mark_completed(&id).await {
                    error!(worker_id, document_id = %id, error = %e, "mark_completed failed");
                }
            }
            Ok(Err(e)) => {
                warn!(worker_id, document_id = %id, error = %e, "processing failed, marking for retry");
                if let Err(e) = self.queue.mark_failed(&id, &e.to_string(), true).await {
                    error!(worker_id, document_id = %id, error = %e, "mark_failed failed");
                }
                self.publish_failure_outcome(&id, &e.to_string()).await;
            }
            Err(_) => {
                warn!(worker_id, document_id = %id, "processing deadline exceeded, marking for retry");
                if let Err(e) = self.queue.mark_failed(&id, "processing deadline exceeded", true).await {
                    error!(worker_id, document_id = %id, error = %e, "mark_failed failed");
                }
                self.publish_failure_outcome(&id, "processing deadline exceeded").await;
            }
        }

        if let Some(path) = temp_path {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                debug!(document_id = %id, path, error = %e, "temp file already gone");
            }
        }
    }

    /// Publishes the terminal/retry lifecycle event `mark_failed` doesn't emit
    /// itself: `document:updated` with `state=failed` once the retry budget is
    /// exhausted (§7, §8 S5), or `state=pending` while a retry is still ahead.
    async fn publish_failure_outcome(&self, document_id: &str, error: &str) {
        let stage = match self.store.load(document_id).await {
            Ok(Some(doc)) => doc.stage,
            Ok(None) => return,
            Err(e) => {
                warn!(document_id, error = %e, "could not load document to publish failure outcome");
                return;
            }
        };

        let state = match stage {
            ProcessingStage::Failed => "failed",
            _ => "pending",
        };
        self.events
            .publish(
                Topic::DocumentUpdated,
                document_id,
                serde_json::json!({ "state": state, "error": error }),
            )
            .await;
    }

    async fn heartbeat_loop(&self, worker_id: String) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.queue.heartbeat(&worker_id).await {
                        warn!(worker_id, error = %e, "heartbeat failed");
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }
    }

    async fn stale_recovery_loop(&self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut ticker = tokio::time::interval(self.config.stale_job_check_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.queue.recover_stale().await {
                        Ok(count) if count > 0 => info!(count, "recovered stale jobs"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "stale recovery failed"),
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }
    }
}
