//! Summarization tool (§4.3, §4.6): 20-second budget, concise style capped at
//! 100 words. Fallback: first three non-empty lines, truncated to 100 chars.

use std::time::Duration;

use async_trait::async_trait;

use super::{Tool, ToolMetadata, default_options, default_requirements, with_timeout};
use crate::gateway::{Gateway, GenerateOptions, Result, TaskRequirements};

const TIMEOUT: Duration = Duration::from_secs(20);
const MAX_INPUT_LEN: usize = 3_000;
const MAX_WORDS: usize = 100;
const FALLBACK_LINE_LEN: usize = 100;

pub struct SummarizationTool;

#[async_trait]
impl Tool for SummarizationTool {
    type Output = String;

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "summarization",
            max_input_len: MAX_INPUT_LEN,
            supports_streaming: false,
        }
    }

    async fn run(&self, gateway: &Gateway, input: &str) -> String {
        let truncated: String = input.chars().take(MAX_INPUT_LEN).collect();
        let requirements = default_requirements("summarization");
        let opts = default_options(TIMEOUT);

        match with_timeout(TIMEOUT, summarize(gateway, &truncated, &requirements, &opts)).await {
            Ok(summary) => summary,
            Err(_) => fallback_summary(&truncated),
        }
    }
}

async fn summarize(
    gateway: &Gateway,
    truncated: &str,
    requirements: &TaskRequirements,
    opts: &GenerateOptions,
) -> Result<String> {
    let provider = gateway.select(requirements)?;
    let prompt = format!(
        "Summarize the following text concisely in at most {MAX_WORDS} words:\n{truncated}"
    );
    Ok(provider.generate(&prompt, opts).await?)
}

fn fallback_summary(text: &str) -> String {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .take(3)
        .map(|l| truncate_chars(l.trim(), FALLBACK_LINE_LEN))
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
