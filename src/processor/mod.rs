//! Processor (C6): orchestrates one document through extraction and, when a
//! Model Gateway is configured, enrichment (language detection + summary).
//!
//! Grounded on the teacher's `handlers::dispatch` request-to-handler flow for
//! the overall "look up by kind, run it, persist the result" shape; the
//! progress-milestone publishing and the AI-timeout-vs-infrastructure-error
//! split are specific to this pipeline (§4.6) and have no teacher analogue.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::document::{Document, DocumentStore, ProcessingStage, StoreError};
use crate::events::{EventBus, Topic};
use crate::extractors::{ExtractorError, Registry, Source};
use crate::gateway::Gateway;
use crate::gateway::tools::Tool;
use crate::gateway::tools::language_detection::LanguageDetectionTool;
use crate::gateway::tools::summarization::SummarizationTool;

const LANGUAGE_DETECTION_INPUT_CHARS: usize = 1_000;
const SUMMARY_INPUT_CHARS: usize = 3_000;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractorError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ProcessorError>;

pub struct Processor {
    store: Arc<dyn DocumentStore>,
    extractors: Arc<Registry>,
    gateway: Option<Arc<Gateway>>,
    events: Arc<EventBus>,
}

impl Processor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        extractors: Arc<Registry>,
        gateway: Option<Arc<Gateway>>,
        events: Arc<EventBus>,
    ) -> Self {
        Self { store, extractors, gateway, events }
    }

    /// Runs the full pipeline for one already-loaded, PROCESSING-state document.
    /// On success the document is COMPLETED and persisted; on error the caller
    /// (the Worker) is responsible for queue disposition.
    pub async fn process(&self, mut doc: Document) -> Result<Document> {
        self.progress(&doc.id, 10, "starting").await;

        let source = source_for(&doc);
        self.progress(&doc.id, 30, "extracting").await;

        let extractor = self.extractors.get(doc.kind)?;
        let extracted = extractor.extract(source, self.gateway.as_deref()).await?;

        doc.raw_text = Some(extracted.raw_text);
        doc.formatted_content = Some(extracted.formatted_markdown);
        doc.structured_data = extracted.structured_data;
        self.progress(&doc.id, 60, "extracted").await;

        if let Some(gateway) = self.gateway.as_deref() {
            self.progress(&doc.id, 70, "enriching").await;
            self.detect_language(gateway, &mut doc).await;

            self.progress(&doc.id, 90, "summarizing").await;
            self.summarize(gateway, &mut doc).await;
        }

        doc.stage = ProcessingStage::Completed;
        doc.updated_at = chrono::Utc::now();
        self.store.save(&doc).await?;
        self.progress(&doc.id, 100, "complete").await;

        self.events
            .publish(
                Topic::DocumentUpdated,
                &doc.id,
                serde_json::json!({ "state": "completed", "summary": doc.summary }),
            )
            .await;

        info!(document_id = %doc.id, "processing completed");
        Ok(doc)
    }

    async fn detect_language(&self, gateway: &Gateway, doc: &mut Document) {
        let Some(raw_text) = doc.raw_text.as_deref() else { return };
        let sample: String = raw_text.chars().take(LANGUAGE_DETECTION_INPUT_CHARS).collect();
        let language = LanguageDetectionTool.run(gateway, &sample).await;
        debug!(document_id = %doc.id, language, "detected language");
        doc.language = Some(language);
    }

    async fn summarize(&self, gateway: &Gateway, doc: &mut Document) {
        let Some(raw_text) = doc.raw_text.as_deref() else { return };
        let sample: String = raw_text.chars().take(SUMMARY_INPUT_CHARS).collect();
        let summary = SummarizationTool.run(gateway, &sample).await;
        doc.summary = Some(summary);
    }

    async fn progress(&self, document_id: &str, progress: u32, message: &str) {
        self.events
            .publish(
                Topic::ProcessingProgress,
                document_id,
                serde_json::json!({ "progress": progress, "message": message }),
            )
            .await;
    }
}

fn source_for(doc: &Document) -> Source<'_> {
    use crate::document::Origin;
    match &doc.origin {
        Origin::Upload(path) => Source::Path(std::path::Path::new(path.as_str())),
        Origin::Url(url) => Source::Url(url.as_str()),
        Origin::Inline => {
            warn!(document_id = %doc.id, "inline origin reached the processor, which expects upload/url");
            Source::Path(std::path::Path::new(""))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::document::{Kind, Origin, filesystem::FjallDocumentStore};
    use std::io::Write;

    #[tokio::test]
    async fn processes_a_text_document_without_a_gateway() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Hello world.\nSecond line.").unwrap();

        let doc = Document::new(
            "d1".into(),
            Kind::Text,
            "note.txt".into(),
            Origin::Upload(file.path().to_string_lossy().into_owned()),
            "u1".into(),
        );

        let store_dir = tempfile::TempDir::new().unwrap();
        let store: Arc<dyn DocumentStore> =
            Arc::new(FjallDocumentStore::open(store_dir.path().join("docs")).unwrap());
        let processor = Processor::new(store.clone(), Arc::new(Registry::new()), None, Arc::new(EventBus::new()));

        let processed = processor.process(doc).await.unwrap();
        assert_eq!(processed.stage, ProcessingStage::Completed);
        assert_eq!(processed.raw_text.as_deref(), Some("Hello world.\nSecond line."));
        assert!(processed.language.is_none());
        assert!(processed.summary.is_none());
    }

    /// A provider that answers literally, unlike [`crate::gateway::tools::mock::MockProvider`]'s
    /// content-free echo — needed here because the language-detection prompt
    /// expects a bare ISO 639-1 code back, not an echo of the prompt itself.
    struct LiteralProvider {
        metadata: crate::gateway::ProviderMetadata,
    }

    #[async_trait::async_trait]
    impl crate::gateway::ModelProvider for LiteralProvider {
        fn metadata(&self) -> &crate::gateway::ProviderMetadata {
            &self.metadata
        }

        async fn generate(&self, prompt: &str, _opts: &crate::gateway::GenerateOptions) -> crate::gateway::Result<String> {
            if prompt.contains("language code") {
                Ok("en".to_string())
            } else {
                Ok("a short summary".to_string())
            }
        }

        async fn embed(&self, _text: &str) -> crate::gateway::Result<Vec<f32>> {
            Ok(vec![0.0; 8])
        }

        async fn health(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn enriches_with_language_and_summary_when_gateway_is_present() {
        use crate::gateway::{Capability, ModelProvider, ProviderMetadata};

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "the quick brown fox and the lazy dog").unwrap();

        let doc = Document::new(
            "d2".into(),
            Kind::Text,
            "note.txt".into(),
            Origin::Upload(file.path().to_string_lossy().into_owned()),
            "u1".into(),
        );

        let metadata = ProviderMetadata {
            id: "literal".to_string(),
            model_id: "literal-1".to_string(),
            enabled: true,
            capabilities: vec![Capability::TextGen],
            cost_tier: 1,
            cost_per_1k_input: 0.0,
            cost_per_1k_output: 0.0,
            avg_latency_ms: 10,
            max_context: 8192,
            quality_score: 0.5,
            preferred_for: vec![],
        };
        let provider: Box<dyn ModelProvider> = Box::new(LiteralProvider { metadata });
        let gateway = Arc::new(Gateway::new(vec![provider], GatewayConfig::default()));

        let store_dir = tempfile::TempDir::new().unwrap();
        let store: Arc<dyn DocumentStore> =
            Arc::new(FjallDocumentStore::open(store_dir.path().join("docs")).unwrap());
        let processor = Processor::new(store, Arc::new(Registry::new()), Some(gateway), Arc::new(EventBus::new()));

        let processed = processor.process(doc).await.unwrap();
        assert_eq!(processed.summary.as_deref(), Some("a short summary"));
        assert_eq!(processed.language.as_deref(), Some("en"));
    }
}
