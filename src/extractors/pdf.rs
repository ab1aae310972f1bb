//! PDF extractor (§4.4): best-effort layout preservation by splitting on the
//! form-feed page breaks `pdf-extract` emits between pages and rendering each
//! page as its own `## Page N` section; a parse failure is treated as
//! malformed input (retryable once), not as an unavailable extractor, since
//! the library itself is always present.

use async_trait::async_trait;
use std::path::PathBuf;

use super::{ExtractionResult, Extractor, ExtractorError, Result, Source};
use crate::gateway::Gateway;

pub struct PdfExtractor;

#[async_trait]
impl Extractor for PdfExtractor {
    async fn extract(&self, source: Source<'_>, _gateway: Option<&Gateway>) -> Result<ExtractionResult> {
        let path = match source {
            Source::Path(p) => p.to_path_buf(),
            Source::Url(_) => {
                return Err(ExtractorError::Malformed("pdf extractor requires a local path".into()));
            }
        };

        let text = extract_blocking(path).await?;
        let formatted_markdown = render_pages(&text);

        Ok(ExtractionResult {
            raw_text: text,
            formatted_markdown,
            structured_data: None,
        })
    }
}

async fn extract_blocking(path: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text(&path).map_err(|e| ExtractorError::Malformed(e.to_string()))
    })
    .await
    .map_err(|e| ExtractorError::Malformed(format!("extraction task panicked: {e}")))?
}

/// Splits on form-feed page breaks and emits one `## Page N` heading per page.
/// Falls back to a single unheaded section if the library didn't separate pages.
fn render_pages(text: &str) -> String {
    let pages: Vec<&str> = text.split('\x0c').map(str::trim).filter(|p| !p.is_empty()).collect();
    if pages.len() <= 1 {
        return text.trim().to_string();
    }
    pages
        .iter()
        .enumerate()
        .map(|(i, page)| format!("## Page {}\n\n{}", i + 1, page))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_pages_emits_headings_for_multi_page_text() {
        let text = "first page\x0csecond page\x0cthird page";
        let rendered = render_pages(text);
        assert!(rendered.contains("## Page 1"));
        assert!(rendered.contains("## Page 2"));
        assert!(rendered.contains("## Page 3"));
        assert!(rendered.contains("second page"));
    }

    #[test]
    fn render_pages_leaves_single_page_text_unheaded() {
        let rendered = render_pages("just one page of text");
        assert_eq!(rendered, "just one page of text");
    }
}
