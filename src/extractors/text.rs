//! Extractor shared by text, markdown, and word kinds (§4.4): read as UTF-8
//! (replacing invalid bytes), then hand off to the text→markdown tool when a
//! Model Gateway is configured. The tool already carries its own 30-second
//! budget and raw-text fallback (see [`crate::gateway::tools::markdown`]), so
//! this extractor only needs to decide whether to call it at all.

use async_trait::async_trait;

use super::{ExtractionResult, Extractor, ExtractorError, Result, Source};
use crate::gateway::Gateway;
use crate::gateway::tools::Tool;
use crate::gateway::tools::markdown::MarkdownTool;

pub struct TextExtractor;

#[async_trait]
impl Extractor for TextExtractor {
    async fn extract(&self, source: Source<'_>, gateway: Option<&Gateway>) -> Result<ExtractionResult> {
        let path = match source {
            Source::Path(p) => p,
            Source::Url(_) => {
                return Err(ExtractorError::Malformed("text extractor requires a local path".into()));
            }
        };

        let bytes = tokio::fs::read(path).await?;
        let raw_text = String::from_utf8_lossy(&bytes).into_owned();

        let formatted_markdown = match gateway {
            Some(gateway) => MarkdownTool.run(gateway, &raw_text).await,
            None => raw_text.clone(),
        };

        Ok(ExtractionResult {
            raw_text,
            formatted_markdown,
            structured_data: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use std::io::Write;

    #[tokio::test]
    async fn reads_utf8_and_falls_back_to_raw_text_without_a_gateway() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "Hello world.\nSecond line.").unwrap();

        let result = TextExtractor
            .extract(Source::Path(file.path()), None)
            .await
            .unwrap();

        assert_eq!(result.raw_text, "Hello world.\nSecond line.");
        assert_eq!(result.formatted_markdown, result.raw_text);
        assert!(result.structured_data.is_none());
    }

    #[tokio::test]
    async fn replaces_invalid_utf8_bytes_rather_than_failing() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"valid text \xff\xfe more text").unwrap();

        let result = TextExtractor
            .extract(Source::Path(file.path()), None)
            .await
            .unwrap();

        assert!(result.raw_text.contains("valid text"));
        assert!(result.raw_text.contains("more text"));
    }
}
