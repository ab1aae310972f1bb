//! Extractors (C4): one implementation per document [`Kind`], dispatched
//! through a static table built at composition-root time — the same
//! tagged-variant-dispatch shape the Model Gateway uses for providers,
//! applied here to content extraction instead of model selection.

pub mod excel;
pub mod media;
pub mod pdf;
pub mod structured;
pub mod text;
pub mod webpage;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::document::Kind;
use crate::gateway::Gateway;

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("no extractor registered for kind {0:?}")]
    Unavailable(Kind),
    #[error("malformed input: {0}")]
    Malformed(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExtractorError>;

/// What an extractor produces from a loaded source (local file path or a
/// remote URL, depending on kind). `structured_data` is populated only by
/// kinds that have a natural tabular/keyed shape (json, csv, excel).
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub raw_text: String,
    pub formatted_markdown: String,
    pub structured_data: Option<serde_json::Value>,
}

/// Where an extractor reads its input from. Upload-derived kinds resolve to a
/// local path; webpage/youtube/podcast resolve to a URL.
#[derive(Debug, Clone)]
pub enum Source<'a> {
    Path(&'a std::path::Path),
    Url(&'a str),
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extracts content from `source`. `gateway` is `None` when no Model
    /// Gateway is configured; extractors that enrich via a tool must fall
    /// back to their raw form in that case, same as when the tool call itself
    /// times out.
    async fn extract(&self, source: Source<'_>, gateway: Option<&Gateway>) -> Result<ExtractionResult>;
}

/// Static registry, keyed by [`Kind`], populated once by the composition root.
pub struct Registry {
    extractors: HashMap<Kind, Box<dyn Extractor>>,
}

impl Registry {
    pub fn new() -> Self {
        let mut extractors: HashMap<Kind, Box<dyn Extractor>> = HashMap::new();
        extractors.insert(Kind::Pdf, Box::new(pdf::PdfExtractor));
        extractors.insert(Kind::Text, Box::new(text::TextExtractor));
        extractors.insert(Kind::Markdown, Box::new(text::TextExtractor));
        extractors.insert(Kind::Word, Box::new(text::TextExtractor));
        extractors.insert(Kind::Json, Box::new(structured::JsonExtractor));
        extractors.insert(Kind::Xml, Box::new(structured::XmlExtractor));
        extractors.insert(Kind::Csv, Box::new(structured::CsvExtractor));
        extractors.insert(Kind::Webpage, Box::new(webpage::WebpageExtractor::default()));
        extractors.insert(Kind::Excel, Box::new(excel::ExcelExtractor));
        extractors.insert(Kind::Youtube, Box::new(media::MediaExtractor::new(media::MediaKind::Video)));
        extractors.insert(Kind::Podcast, Box::new(media::MediaExtractor::new(media::MediaKind::Audio)));
        Self { extractors }
    }

    pub fn get(&self, kind: Kind) -> Result<&dyn Extractor> {
        self.extractors
            .get(&kind)
            .map(|b| b.as_ref())
            .ok_or(ExtractorError::Unavailable(kind))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
