//! Submission Service (C8): the single entry point that turns raw input into
//! a persisted [`Document`], completing synchronously for direct-content
//! kinds and handing everything else to the Queue (§4.8).

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::document::{Document, DocumentStore, Kind, Origin, StoreError};
use crate::events::{EventBus, Topic};
use crate::extractors::{ExtractorError, Registry, Source};
use crate::queue::{Queue, QueueError};

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("cannot derive a document kind from name {0:?}")]
    UnknownKind(String),
    #[error("direct-content submission requires inline bytes, not a URL")]
    DirectContentNeedsBytes,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractorError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SubmissionError>;

/// Where the document's content comes from at submission time.
pub enum Input {
    Bytes(Vec<u8>),
    Url(String),
}

pub struct SubmissionOutcome {
    pub document_id: String,
    pub queued: bool,
}

pub struct SubmissionService {
    store: Arc<dyn DocumentStore>,
    queue: Arc<dyn Queue>,
    events: Arc<EventBus>,
    extractors: Arc<Registry>,
}

impl SubmissionService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        queue: Arc<dyn Queue>,
        events: Arc<EventBus>,
        extractors: Arc<Registry>,
    ) -> Self {
        Self { store, queue, events, extractors }
    }

    pub async fn submit(&self, kind: Option<Kind>, name: &str, input: Input, owner: &str) -> Result<SubmissionOutcome> {
        let kind = match kind {
            Some(kind) => kind,
            None => derive_kind(name)?,
        };

        if kind.is_direct_content() {
            self.submit_direct_content(kind, name, input, owner).await
        } else {
            self.submit_async(kind, name, input, owner).await
        }
    }

    async fn submit_direct_content(&self, kind: Kind, name: &str, input: Input, owner: &str) -> Result<SubmissionOutcome> {
        let Input::Bytes(bytes) = input else {
            return Err(SubmissionError::DirectContentNeedsBytes);
        };

        let id = Uuid::new_v4().to_string();
        let temp_file = tempfile::NamedTempFile::new()?;
        tokio::fs::write(temp_file.path(), &bytes).await?;

        let extractor = self.extractors.get(kind)?;
        let extracted = extractor.extract(Source::Path(temp_file.path()), None).await?;

        let mut doc = Document::new(id.clone(), kind, name.to_string(), Origin::Inline, owner.to_string());
        doc.raw_text = Some(extracted.raw_text);
        doc.formatted_content = Some(extracted.formatted_markdown);
        doc.structured_data = extracted.structured_data;

        self.store.save(&doc).await?;
        self.events
            .publish(Topic::DocumentCreated, &doc.id, serde_json::json!({ "state": "completed" }))
            .await;

        Ok(SubmissionOutcome { document_id: id, queued: false })
    }

    async fn submit_async(&self, kind: Kind, name: &str, input: Input, owner: &str) -> Result<SubmissionOutcome> {
        let id = Uuid::new_v4().to_string();

        let origin = match input {
            Input::Url(url) => Origin::Url(url),
            Input::Bytes(bytes) => {
                let temp_file = tempfile::NamedTempFile::new()?;
                tokio::fs::write(temp_file.path(), &bytes).await?;
                let (_, path) = temp_file.keep().map_err(|e| std::io::Error::other(e.to_string()))?;
                Origin::Upload(path.to_string_lossy().into_owned())
            }
        };

        let doc = Document::new(id.clone(), kind, name.to_string(), origin, owner.to_string());
        self.store.save(&doc).await?;
        self.events
            .publish(Topic::DocumentCreated, &doc.id, serde_json::json!({ "state": "pending" }))
            .await;
        self.queue.enqueue(&id, None).await?;

        Ok(SubmissionOutcome { document_id: id, queued: true })
    }
}

fn derive_kind(name: &str) -> Result<Kind> {
    let ext = name.rsplit('.').next().unwrap_or("");
    Kind::from_extension(ext).ok_or_else(|| SubmissionError::UnknownKind(name.to_string()))
}
