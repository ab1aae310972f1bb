//! Tools (§4.3): higher-level operations layered over `ModelProvider::generate`.
//!
//! Grounded on the teacher's `handlers::JobHandler` trait (one associated
//! behavior per registered kind, invoked through a uniform `handle()` entry
//! point) — the same shape here: one `Tool` per capability, all driven through
//! `Tool::run`, with the chunk/merge and timeout/fallback logic factored out so
//! individual tools stay thin.

pub mod classification;
pub mod embedding;
pub mod entity_extraction;
pub mod language_detection;
pub mod markdown;
pub mod mock;
pub mod question_answering;
pub mod summarization;
pub mod translation;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::{Gateway, GatewayError, GenerateOptions, TaskRequirements};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("input exceeds max length {max} (got {actual})")]
    InputTooLong { max: usize, actual: usize },
    #[error("model call timed out, falling back")]
    TimedOut,
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// A tool's declared capabilities, consulted by callers that need to validate a
/// request before invoking it (§4.3).
#[derive(Debug, Clone)]
pub struct ToolMetadata {
    pub name: &'static str,
    pub max_input_len: usize,
    pub supports_streaming: bool,
}

#[async_trait]
pub trait Tool: Send + Sync {
    type Output;

    fn metadata(&self) -> ToolMetadata;

    /// Runs the tool against `gateway`. Implementations are expected to call
    /// [`with_timeout`] around the model call and fall back to a degraded
    /// heuristic on timeout or error, per §4.3's failure-handling contract.
    async fn run(&self, gateway: &Gateway, input: &str) -> Self::Output;
}

/// `CHUNK = 40,000 chars, overlap = 500 chars`, per §4.3.
pub const CHUNK_SIZE: usize = 40_000;
pub const CHUNK_OVERLAP: usize = 500;

/// Splits `text` into overlapping windows for tools whose inputs may exceed a
/// single model call's practical context.
pub fn chunk(text: &str) -> Vec<&str> {
    if text.len() <= CHUNK_SIZE {
        return vec![text];
    }

    let bytes = text.as_bytes();
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < bytes.len() {
        let end = (start + CHUNK_SIZE).min(bytes.len());
        let end = floor_char_boundary(text, end);
        chunks.push(&text[start..end]);
        if end == bytes.len() {
            break;
        }
        start = end.saturating_sub(CHUNK_OVERLAP);
        start = floor_char_boundary(text, start);
    }
    chunks
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Runs a model call with a timeout, mapping an elapsed deadline to
/// [`ToolError::TimedOut`] so callers can apply their fallback.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T>
where
    F: std::future::Future<Output = super::Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ToolError::Gateway(e)),
        Err(_) => Err(ToolError::TimedOut),
    }
}

pub(super) fn default_requirements(task: &str) -> TaskRequirements {
    TaskRequirements {
        task: Some(task.to_string()),
        ..Default::default()
    }
}

pub(super) fn default_options(timeout: Duration) -> GenerateOptions {
    GenerateOptions {
        timeout,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_returns_single_chunk_for_short_text() {
        let text = "hello world";
        assert_eq!(chunk(text), vec![text]);
    }

    #[test]
    fn chunk_splits_long_text_with_overlap() {
        let text = "a".repeat(CHUNK_SIZE + 1000);
        let chunks = chunk(&text);
        assert!(chunks.len() >= 2);
        // Every char of the original text is covered by some chunk boundary.
        assert!(chunks[0].len() <= CHUNK_SIZE);
    }

    #[test]
    fn chunk_respects_utf8_boundaries() {
        let text = "é".repeat(CHUNK_SIZE);
        let chunks = chunk(&text);
        for c in chunks {
            assert!(std::str::from_utf8(c.as_bytes()).is_ok());
        }
    }
}
