//! Translation tool (§4.3): chunks long input, translates each chunk, and
//! concatenates the results in order separated by a single space. On failure
//! a chunk's original text is kept untranslated rather than dropped.

use std::time::Duration;

use async_trait::async_trait;

use super::{Tool, ToolMetadata, chunk, default_options, default_requirements, with_timeout};
use crate::gateway::{Gateway, GenerateOptions, TaskRequirements};

const TIMEOUT: Duration = Duration::from_secs(30);
const MAX_INPUT_LEN: usize = 1_000_000;

pub struct TranslationTool {
    pub target_language: String,
}

#[async_trait]
impl Tool for TranslationTool {
    type Output = String;

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "translation",
            max_input_len: MAX_INPUT_LEN,
            supports_streaming: false,
        }
    }

    async fn run(&self, gateway: &Gateway, input: &str) -> String {
        let requirements = default_requirements("translation");
        let opts = default_options(TIMEOUT);

        let mut translated = Vec::new();
        for piece in chunk(input) {
            let result = with_timeout(
                TIMEOUT,
                translate(gateway, piece, &self.target_language, &requirements, &opts),
            )
            .await;
            translated.push(result.unwrap_or_else(|_| piece.to_string()));
        }
        translated.join(" ")
    }
}

async fn translate(
    gateway: &Gateway,
    piece: &str,
    target_language: &str,
    requirements: &TaskRequirements,
    opts: &GenerateOptions,
) -> crate::gateway::Result<String> {
    let provider = gateway.select(requirements)?;
    let prompt = format!("Translate the following text to {target_language}:\n{piece}");
    Ok(provider.generate(&prompt, opts).await?)
}
