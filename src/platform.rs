//! Composition root: wires the Document Store, Queue, Model Gateway,
//! Extractors, Event Bus, Submission Service, and Worker Pool from a
//! [`Config`], with no module-level mutable state (§9 Design Notes).
//!
//! Grounded on the teacher's `main.rs` startup sequence (load config, build
//! storage/queue adapters, build the router, serve) — generalized here to a
//! library-level struct instead of an HTTP server, per the library-level
//! surface in §6.1.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::{Config, StoreBackend};
use crate::document::{
    Document, DocumentProjection, DocumentStore, ListFilter, ProcessingStage, StoreError,
    filesystem::FjallDocumentStore, redis_store::RedisDocumentStore,
};
use crate::events::{EventBus, Filter, Subscription};
use crate::extractors::Registry;
use crate::gateway::{Gateway, ModelProvider, metadata_from_profile};
use crate::queue::{Queue, QueueBackend, QueueError, QueueStats, memory::MemoryQueue, redis_queue::RedisQueue};
use crate::submission::SubmissionService;
use crate::worker::{WorkerPool, WorkerPoolConfig};

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("store backend {0:?} requires redis_url to be set")]
    MissingStoreRedisUrl(StoreBackend),
    #[error("queue backend requires redis_url to be set")]
    MissingQueueRedisUrl,
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("only pending documents can be cancelled, document {0} is {1:?}")]
    NotCancellable(String, ProcessingStage),
}

/// Status of a single job, as seen from the outside: the document's own
/// processing stage plus the queue-wide counters it competes with (§6.1
/// `job_status`). Per-job retry counts and last errors live as Queue side
/// keys (Open Question 1, SPEC_FULL §9), not surfaced here individually.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub document_id: String,
    pub stage: ProcessingStage,
    pub queue: QueueStats,
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Everything the pipeline needs at runtime, built once at startup.
pub struct Platform {
    pub store: Arc<dyn DocumentStore>,
    pub queue: Arc<dyn Queue>,
    pub gateway: Option<Arc<Gateway>>,
    pub extractors: Arc<Registry>,
    pub events: Arc<EventBus>,
    pub submission: Arc<SubmissionService>,
    pub worker_pool: Arc<WorkerPool>,
}

impl Platform {
    /// Builds every component from `config`. `providers` are the caller's
    /// concrete [`ModelProvider`] instances (e.g. a real AI SDK client, or
    /// [`crate::gateway::tools::mock::MockProvider`] for a demo/test run) —
    /// construction is out of this crate's scope (§1), so they're supplied
    /// rather than built here.
    pub async fn build(config: Config, providers: Vec<Box<dyn ModelProvider>>) -> Result<Self> {
        let store = build_store(&config).await?;
        let queue_config: crate::queue::QueueConfig = config.queue.clone().into();
        let queue = build_queue(&queue_config, store.clone()).await?;
        let events = Arc::new(EventBus::new());
        let extractors = Arc::new(Registry::new());

        let gateway = if config.gateway.providers.is_empty() && providers.is_empty() {
            None
        } else {
            Some(Arc::new(Gateway::new(providers, config.gateway.clone())))
        };

        let submission = Arc::new(SubmissionService::new(
            store.clone(),
            queue.clone(),
            events.clone(),
            extractors.clone(),
        ));

        let processor = Arc::new(crate::processor::Processor::new(
            store.clone(),
            extractors.clone(),
            gateway.clone(),
            events.clone(),
        ));
        let worker_pool = Arc::new(WorkerPool::new(
            queue.clone(),
            store.clone(),
            processor,
            events.clone(),
            WorkerPoolConfig::from(&queue_config),
        ));

        info!("platform composed");
        Ok(Self { store, queue, gateway, extractors, events, submission, worker_pool })
    }

    /// Loads a single document (§6.1 `get`).
    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.store.load(id).await?)
    }

    /// Lists documents by the given filter (§6.1 `list`).
    pub async fn list(&self, filter: ListFilter) -> Result<Vec<DocumentProjection>> {
        Ok(self.store.list(filter).await?)
    }

    /// Writes back a caller-modified document as a new version (§6.1 `update`,
    /// §3.2 version history). The caller is responsible for producing the
    /// updated `Document` (e.g. editing tags or access control) — this crate
    /// does not interpret field-level permissions (§3.1).
    pub async fn update(&self, mut doc: Document, user: &str, change_description: &str) -> Result<Document> {
        doc.version += 1;
        doc.updated_at = chrono::Utc::now();
        let version = crate::document::DocumentVersion {
            version: doc.version,
            timestamp: doc.updated_at,
            user: user.to_string(),
            change_description: change_description.to_string(),
            commit_message: None,
            snapshot: doc.clone(),
        };
        self.store.save(&doc).await?;
        self.store.save_version(&version).await?;
        self.events
            .publish(crate::events::Topic::DocumentUpdated, &doc.id, serde_json::json!({"version": doc.version}))
            .await;
        Ok(doc)
    }

    /// Deletes a document, soft by default (§6.1 `delete`, §3.1 access model).
    pub async fn delete(&self, id: &str, soft: bool, user: &str) -> Result<()> {
        self.store.delete(id, soft, user).await?;
        self.events
            .publish(crate::events::Topic::DocumentDeleted, id, serde_json::json!({"soft": soft}))
            .await;
        Ok(())
    }

    /// Reports a document's processing stage alongside queue-wide counters
    /// (§6.1 `job_status`).
    pub async fn job_status(&self, id: &str) -> Result<JobStatus> {
        let doc = self.store.load(id).await?.ok_or_else(|| PlatformError::NotFound(id.to_string()))?;
        let stats = self.queue.stats().await?;
        Ok(JobStatus { document_id: id.to_string(), stage: doc.stage, queue: stats })
    }

    /// Cancels a still-pending job (§6.1 `cancel`). Only valid while the
    /// document is PENDING (Open Question 2, SPEC_FULL §9): once a worker has
    /// dequeued it, cancellation would race an in-flight `Processor::process`
    /// call this crate has no way to interrupt. Soft-deletes the document so
    /// the Queue's dequeue loop discards it if it's still sitting in the
    /// pending set (it checks `doc.deleted` before transitioning to
    /// PROCESSING, treating a cancelled job like a discarded orphan id).
    pub async fn cancel(&self, id: &str, user: &str) -> Result<()> {
        let doc = self.store.load(id).await?.ok_or_else(|| PlatformError::NotFound(id.to_string()))?;
        if doc.stage != ProcessingStage::Pending {
            return Err(PlatformError::NotCancellable(id.to_string(), doc.stage));
        }
        self.store.delete(id, true, user).await?;
        self.events
            .publish(crate::events::Topic::DocumentDeleted, id, serde_json::json!({"reason": "cancelled"}))
            .await;
        Ok(())
    }

    /// Subscribes to the Event Bus (§6.1 `subscribe`).
    pub async fn subscribe(&self, filter: Filter) -> Subscription {
        self.events.subscribe(filter).await
    }
}

async fn build_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    match config.store.backend {
        StoreBackend::Filesystem => Ok(Arc::new(FjallDocumentStore::open(&config.store.path)?)),
        StoreBackend::Redis => {
            let url = config
                .store
                .redis_url
                .as_deref()
                .ok_or(PlatformError::MissingStoreRedisUrl(StoreBackend::Redis))?;
            Ok(Arc::new(RedisDocumentStore::connect(url).await?))
        }
    }
}

async fn build_queue(queue_config: &crate::queue::QueueConfig, store: Arc<dyn DocumentStore>) -> Result<Arc<dyn Queue>> {
    match queue_config.backend {
        QueueBackend::Memory => Ok(Arc::new(MemoryQueue::new(store, queue_config.clone()))),
        QueueBackend::Redis => {
            let url = queue_config
                .redis_url
                .clone()
                .ok_or(PlatformError::MissingQueueRedisUrl)?;
            Ok(Arc::new(RedisQueue::connect(&url, store, queue_config.clone()).await?))
        }
    }
}

/// Convenience used by callers building a `Gateway` directly from config
/// profiles, e.g. the demo harness before real providers exist.
pub fn provider_metadata_from_config(config: &Config) -> Vec<crate::gateway::ProviderMetadata> {
    config
        .gateway
        .providers
        .iter()
        .map(|(id, profile)| metadata_from_profile(id, profile))
        .collect()
}
