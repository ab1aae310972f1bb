//! Queue (C2): priority-ordered pending set, in-flight hash, dead-letter set, and
//! worker liveness registry, as a Redis-shaped but backend-agnostic distributed
//! queue (§4.2).
//!
//! Grounded on the teacher's `queue::store::FjallQueue` / `queue::broker::TaskBroker`
//! for the general shape (an atomic-append store plus explicit partitions), and on
//! the `redis` crate usage in the video-generation worker reference example for the
//! real cross-process backend. The teacher's queue was a single-process
//! round-robin broker; this one implements the spec's pop-minimum/in-flight/retry
//! state machine instead, which the teacher's design cannot express.

pub mod memory;
pub mod redis_queue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::StoreError;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend unavailable: {0}")]
    Backend(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub redis_url: Option<String>,
    pub max_concurrent_workers: usize,
    pub processing_timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub stale_job_check_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub stale_worker_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Memory,
            redis_url: None,
            max_concurrent_workers: 3,
            processing_timeout_secs: 300,
            retry_max_attempts: 3,
            stale_job_check_interval_secs: 60,
            heartbeat_interval_secs: 30,
            stale_worker_timeout_secs: 120,
        }
    }
}

/// Exponential backoff, capped at 300s, used by `mark_failed` for the re-enqueue
/// delay: `min(300, 10 * 2^n)`.
pub fn backoff_secs(retry_count: u32) -> i64 {
    let scaled = 10u64.saturating_mul(1u64 << retry_count.min(62));
    scaled.min(300) as i64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InFlightEntry {
    pub worker_id: String,
    pub started_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending_len: usize,
    pub in_flight_len: usize,
    pub failed_len: usize,
    pub live_workers: usize,
}

/// The Queue contract (§4.2). All implementations must guarantee that
/// pop-minimum is atomic across processes: two concurrent `dequeue` calls never
/// return the same id (Testable Property 1, SPEC_FULL §8).
#[async_trait]
pub trait Queue: Send + Sync {
    /// Adds `id` to `pending` with the given priority (default: now). Idempotent:
    /// re-enqueuing an id already pending updates its priority rather than
    /// duplicating the entry.
    async fn enqueue(&self, id: &str, priority: Option<DateTime<Utc>>) -> Result<()>;

    /// Pops up to `batch_n` ids whose priority has elapsed, loads each document via
    /// the Document Store, transitions it to PROCESSING, and records an in-flight
    /// entry for `worker_id`. Orphan ids (popped but not loadable) are discarded
    /// silently.
    async fn dequeue(
        &self,
        worker_id: &str,
        batch_n: usize,
    ) -> Result<Vec<crate::document::Document>>;

    async fn mark_completed(&self, id: &str) -> Result<()>;

    /// If `retry` and the retry budget is not exhausted, re-enqueues with
    /// exponential backoff; otherwise moves the id to `failed` (dead-letter).
    async fn mark_failed(&self, id: &str, error: &str, retry: bool) -> Result<()>;

    /// Re-enqueues any in-flight entry whose `timeout_at` has passed and whose
    /// worker registry entry has expired. Returns the number recovered.
    async fn recover_stale(&self) -> Result<usize>;

    async fn stats(&self) -> Result<QueueStats>;

    /// Refreshes `worker_id`'s liveness TTL key.
    async fn heartbeat(&self, worker_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_matches_min_300_10_times_2_to_the_n() {
        assert_eq!(backoff_secs(0), 10);
        assert_eq!(backoff_secs(1), 20);
        assert_eq!(backoff_secs(2), 40);
        assert_eq!(backoff_secs(5), 300);
        assert_eq!(backoff_secs(10), 300);
    }

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.max_concurrent_workers, 3);
        assert_eq!(cfg.processing_timeout_secs, 300);
        assert_eq!(cfg.stale_job_check_interval_secs, 60);
        assert_eq!(cfg.heartbeat_interval_secs, 30);
        assert_eq!(cfg.stale_worker_timeout_secs, 120);
    }
}
