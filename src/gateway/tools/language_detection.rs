//! Language detection tool (§4.3, §4.6): 10-second budget, keyword-frequency
//! fallback across a closed set of language profiles on timeout or error.

use std::time::Duration;

use async_trait::async_trait;

use super::{Tool, ToolMetadata, default_options, default_requirements, with_timeout};
use crate::gateway::{Gateway, GenerateOptions, Result, TaskRequirements};

const TIMEOUT: Duration = Duration::from_secs(10);
const MAX_INPUT_LEN: usize = 1_000;

/// Closed set of keyword profiles used by the degradation heuristic. Each is a
/// short list of unmistakably-language-specific stopwords.
const PROFILES: &[(&str, &[&str])] = &[
    ("en", &["the", "and", "is", "of", "to", "in"]),
    ("es", &["el", "la", "de", "que", "y", "en"]),
    ("fr", &["le", "la", "de", "et", "les", "des"]),
    ("de", &["der", "die", "und", "das", "ist", "nicht"]),
    ("pt", &["o", "a", "de", "que", "e", "do"]),
];

pub struct LanguageDetectionTool;

#[async_trait]
impl Tool for LanguageDetectionTool {
    type Output = String;

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "language_detection",
            max_input_len: MAX_INPUT_LEN,
            supports_streaming: false,
        }
    }

    async fn run(&self, gateway: &Gateway, input: &str) -> String {
        let truncated: String = input.chars().take(MAX_INPUT_LEN).collect();
        let requirements = default_requirements("language_detection");
        let opts = default_options(TIMEOUT);

        match with_timeout(TIMEOUT, detect(gateway, &truncated, &requirements, &opts)).await {
            Ok(code) => code.trim().to_lowercase(),
            Err(_) => keyword_fallback(&truncated),
        }
    }
}

async fn detect(
    gateway: &Gateway,
    truncated: &str,
    requirements: &TaskRequirements,
    opts: &GenerateOptions,
) -> Result<String> {
    let provider = gateway.select(requirements)?;
    let prompt = format!(
        "Identify the ISO 639-1 language code of this text, respond with only the code:\n{truncated}"
    );
    Ok(provider.generate(&prompt, opts).await?)
}

/// Scores each profile by stopword hits and returns the best match, defaulting
/// to `en` when nothing scores above zero.
fn keyword_fallback(text: &str) -> String {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    let mut best = ("en", 0usize);
    for (code, keywords) in PROFILES {
        let score = words.iter().filter(|w| keywords.contains(w)).count();
        if score > best.1 {
            best = (code, score);
        }
    }
    best.0.to_string()
}
