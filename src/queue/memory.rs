//! Single-process in-memory Queue backend, for tests and the demo harness.
//!
//! Grounded on the teacher's `queue::broker::TaskBroker`, which guards its queue
//! state behind a single `RwLock`/mutex and performs each transition as one
//! critical section — the same approach used here for the pending/in-flight/
//! failed partitions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::document::{Document, DocumentStore, ProcessingStage};

use super::{InFlightEntry, Queue, QueueConfig, QueueStats, Result, backoff_secs};

#[derive(Default)]
struct State {
    pending: HashMap<String, DateTime<Utc>>,
    in_flight: HashMap<String, InFlightEntry>,
    failed: HashMap<String, DateTime<Utc>>,
    retry_count: HashMap<String, u32>,
    last_error: HashMap<String, String>,
    workers: HashMap<String, DateTime<Utc>>,
}

pub struct MemoryQueue {
    state: Mutex<State>,
    store: Arc<dyn DocumentStore>,
    config: QueueConfig,
}

impl MemoryQueue {
    pub fn new(store: Arc<dyn DocumentStore>, config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(State::default()),
            store,
            config,
        }
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn enqueue(&self, id: &str, priority: Option<DateTime<Utc>>) -> Result<()> {
        let priority = priority.unwrap_or_else(Utc::now);
        let mut state = self.state.lock().await;
        state.pending.insert(id.to_string(), priority);
        debug!(document_id = id, "enqueued");
        Ok(())
    }

    async fn dequeue(&self, worker_id: &str, batch_n: usize) -> Result<Vec<Document>> {
        let now = Utc::now();
        let ids: Vec<String> = {
            let mut state = self.state.lock().await;
            let mut ready: Vec<(DateTime<Utc>, String)> = state
                .pending
                .iter()
                .filter(|(_, priority)| **priority <= now)
                .map(|(id, priority)| (*priority, id.clone()))
                .collect();
            ready.sort();
            ready.truncate(batch_n);

            let timeout_at = now + Duration::seconds(self.config.processing_timeout_secs as i64);
            for (_, id) in &ready {
                state.pending.remove(id);
                state.in_flight.insert(
                    id.clone(),
                    InFlightEntry {
                        worker_id: worker_id.to_string(),
                        started_at: now,
                        timeout_at,
                    },
                );
            }
            ready.into_iter().map(|(_, id)| id).collect()
        };

        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.load(&id).await? {
                Some(doc) if doc.deleted => {
                    debug!(document_id = id, "dequeued cancelled document, discarding");
                    let mut state = self.state.lock().await;
                    state.in_flight.remove(&id);
                }
                Some(mut doc) => {
                    doc.stage = ProcessingStage::Processing;
                    doc.updated_at = now;
                    self.store.save(&doc).await?;
                    documents.push(doc);
                }
                None => {
                    warn!(document_id = id, "dequeued orphan id, discarding");
                    let mut state = self.state.lock().await;
                    state.in_flight.remove(&id);
                }
            }
        }
        Ok(documents)
    }

    async fn mark_completed(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.in_flight.remove(id);
        state.retry_count.remove(id);
        state.last_error.remove(id);
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str, retry: bool) -> Result<()> {
        let will_retry = {
            let mut state = self.state.lock().await;
            state.in_flight.remove(id);
            state.last_error.insert(id.to_string(), error.to_string());
            let retry_count = *state.retry_count.get(id).unwrap_or(&0) + 1;
            state.retry_count.insert(id.to_string(), retry_count);

            let will_retry = retry && retry_count <= self.config.retry_max_attempts;
            if will_retry {
                let delay = backoff_secs(retry_count);
                state
                    .pending
                    .insert(id.to_string(), Utc::now() + Duration::seconds(delay));
            } else {
                state.failed.insert(id.to_string(), Utc::now());
            }
            will_retry
        };

        if let Some(mut doc) = self.store.load(id).await? {
            doc.stage = if will_retry { ProcessingStage::Pending } else { ProcessingStage::Failed };
            doc.updated_at = Utc::now();
            self.store.save(&doc).await?;
        }
        Ok(())
    }

    async fn recover_stale(&self) -> Result<usize> {
        let now = Utc::now();
        let stale: Vec<(String, InFlightEntry)> = {
            let mut state = self.state.lock().await;

            let stale: Vec<(String, InFlightEntry)> = state
                .in_flight
                .iter()
                .filter(|(_, entry)| {
                    if entry.timeout_at >= now {
                        return false;
                    }
                    match state.workers.get(&entry.worker_id) {
                        Some(expires_at) => *expires_at < now,
                        None => true,
                    }
                })
                .map(|(id, entry)| (id.clone(), entry.clone()))
                .collect();

            for (id, entry) in &stale {
                state.in_flight.remove(id);
                state.last_error.insert(
                    id.clone(),
                    format!("worker {} timed out", entry.worker_id),
                );
                let retry_count = *state.retry_count.get(id).unwrap_or(&0) + 1;
                state.retry_count.insert(id.clone(), retry_count);
                state.pending.insert(id.clone(), now);
            }
            stale
        };

        for (id, _) in &stale {
            if let Some(mut doc) = self.store.load(id).await? {
                doc.stage = ProcessingStage::Pending;
                doc.updated_at = now;
                self.store.save(&doc).await?;
            }
        }

        if !stale.is_empty() {
            debug!(count = stale.len(), "recovered stale jobs");
        }
        Ok(stale.len())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let now = Utc::now();
        let state = self.state.lock().await;
        Ok(QueueStats {
            pending_len: state.pending.len(),
            in_flight_len: state.in_flight.len(),
            failed_len: state.failed.len(),
            live_workers: state.workers.values().filter(|exp| **exp >= now).count(),
        })
    }

    async fn heartbeat(&self, worker_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.workers.insert(
            worker_id.to_string(),
            Utc::now() + Duration::seconds(self.config.stale_worker_timeout_secs as i64),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Kind, Origin, filesystem::FjallDocumentStore};
    use tempfile::TempDir;

    async fn store() -> (Arc<dyn DocumentStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FjallDocumentStore::open(dir.path().join("docs")).unwrap();
        (Arc::new(store), dir)
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_transitions_to_processing() {
        let (store, _dir) = store().await;
        let doc = Document::new("d1".into(), Kind::Text, "a.txt".into(), Origin::Inline, "u1".into());
        store.save(&doc).await.unwrap();

        let queue = MemoryQueue::new(store.clone(), QueueConfig::default());
        queue.enqueue("d1", None).await.unwrap();

        let batch = queue.dequeue("w1", 1).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].stage, ProcessingStage::Processing);

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending_len, 0);
        assert_eq!(stats.in_flight_len, 1);
    }

    #[tokio::test]
    async fn two_dequeues_never_return_the_same_id() {
        let (store, _dir) = store().await;
        for id in ["x", "y"] {
            let doc = Document::new(id.into(), Kind::Text, format!("{id}.txt"), Origin::Inline, "u1".into());
            store.save(&doc).await.unwrap();
        }

        let queue = Arc::new(MemoryQueue::new(store.clone(), QueueConfig::default()));
        queue.enqueue("x", None).await.unwrap();
        queue.enqueue("y", None).await.unwrap();

        let a = queue.dequeue("w1", 1).await.unwrap();
        let b = queue.dequeue("w2", 1).await.unwrap();
        assert_ne!(a[0].id, b[0].id);
    }

    #[tokio::test]
    async fn mark_failed_with_retry_reenqueues_with_backoff() {
        let (store, _dir) = store().await;
        let doc = Document::new("d1".into(), Kind::Text, "a.txt".into(), Origin::Inline, "u1".into());
        store.save(&doc).await.unwrap();

        let queue = MemoryQueue::new(store.clone(), QueueConfig::default());
        queue.enqueue("d1", None).await.unwrap();
        queue.dequeue("w1", 1).await.unwrap();
        queue.mark_failed("d1", "boom", true).await.unwrap();

        let state = queue.state.lock().await;
        assert!(state.pending.contains_key("d1"));
        assert_eq!(*state.retry_count.get("d1").unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_failed_without_retry_budget_moves_to_failed() {
        let (store, _dir) = store().await;
        let doc = Document::new("d1".into(), Kind::Text, "a.txt".into(), Origin::Inline, "u1".into());
        store.save(&doc).await.unwrap();

        let mut config = QueueConfig::default();
        config.retry_max_attempts = 0;
        let queue = MemoryQueue::new(store.clone(), config);
        queue.enqueue("d1", None).await.unwrap();
        queue.dequeue("w1", 1).await.unwrap();
        queue.mark_failed("d1", "boom", true).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.failed_len, 1);
        assert_eq!(stats.pending_len, 0);
        let doc = store.load("d1").await.unwrap().unwrap();
        assert_eq!(doc.stage, ProcessingStage::Failed);
    }

    /// §8 S5: with `retry_max_attempts=2`, a job gets `max_attempts + 1` total
    /// attempts (1, 2, 3) before landing in `failed`, not just `max_attempts`.
    #[tokio::test]
    async fn retry_budget_allows_max_attempts_plus_one_tries_before_dead_lettering() {
        let (store, _dir) = store().await;
        let doc = Document::new("d1".into(), Kind::Text, "a.txt".into(), Origin::Inline, "u1".into());
        store.save(&doc).await.unwrap();

        let mut config = QueueConfig::default();
        config.retry_max_attempts = 2;
        let queue = MemoryQueue::new(store.clone(), config);
        queue.enqueue("d1", None).await.unwrap();

        // Attempt 1: fails, retried (retry_count=1 <= 2).
        queue.dequeue("w1", 1).await.unwrap();
        queue.mark_failed("d1", "boom", true).await.unwrap();
        assert_eq!(queue.stats().await.unwrap().failed_len, 0);
        assert_eq!(store.load("d1").await.unwrap().unwrap().stage, ProcessingStage::Pending);

        // Force the backoff delay out of the way so the next dequeue sees it.
        {
            let mut state = queue.state.lock().await;
            state.pending.insert("d1".to_string(), Utc::now());
        }

        // Attempt 2: fails, retried (retry_count=2 <= 2).
        queue.dequeue("w1", 1).await.unwrap();
        queue.mark_failed("d1", "boom", true).await.unwrap();
        assert_eq!(queue.stats().await.unwrap().failed_len, 0);

        {
            let mut state = queue.state.lock().await;
            state.pending.insert("d1".to_string(), Utc::now());
        }

        // Attempt 3: fails, retry_count=3 > 2, dead-lettered.
        queue.dequeue("w1", 1).await.unwrap();
        queue.mark_failed("d1", "boom", true).await.unwrap();
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.failed_len, 1);
        assert_eq!(stats.pending_len, 0);
        let doc = store.load("d1").await.unwrap().unwrap();
        assert_eq!(doc.stage, ProcessingStage::Failed);
    }

    #[tokio::test]
    async fn recover_stale_requeues_jobs_with_dead_workers() {
        let (store, _dir) = store().await;
        let doc = Document::new("d1".into(), Kind::Text, "a.txt".into(), Origin::Inline, "u1".into());
        store.save(&doc).await.unwrap();

        let mut config = QueueConfig::default();
        config.processing_timeout_secs = 0;
        let queue = MemoryQueue::new(store.clone(), config);
        queue.enqueue("d1", None).await.unwrap();
        queue.dequeue("w1", 1).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let recovered = queue.recover_stale().await.unwrap();
        assert_eq!(recovered, 1);

        {
            let state = queue.state.lock().await;
            assert!(state.pending.contains_key("d1"));
            assert!(state.last_error.get("d1").unwrap().contains("w1 timed out"));
        }
        assert_eq!(store.load("d1").await.unwrap().unwrap().stage, ProcessingStage::Pending);
    }

    #[tokio::test]
    async fn idempotent_enqueue_does_not_duplicate() {
        let (store, _dir) = store().await;
        let doc = Document::new("d1".into(), Kind::Text, "a.txt".into(), Origin::Inline, "u1".into());
        store.save(&doc).await.unwrap();

        let queue = MemoryQueue::new(store.clone(), QueueConfig::default());
        queue.enqueue("d1", None).await.unwrap();
        queue.enqueue("d1", None).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending_len, 1);
    }
}
