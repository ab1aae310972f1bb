//! Text-to-markdown formatting tool (§4.3, §4.4): used by the text/word/
//! markdown extractors when the gateway is available. 30-second budget; on
//! failure the raw text is used unformatted.

use std::time::Duration;

use async_trait::async_trait;

use super::{Tool, ToolMetadata, default_options, default_requirements, with_timeout};
use crate::gateway::{Gateway, GenerateOptions, TaskRequirements};

const TIMEOUT: Duration = Duration::from_secs(30);
const MAX_INPUT_LEN: usize = 1_000_000;

pub struct MarkdownTool;

#[async_trait]
impl Tool for MarkdownTool {
    type Output = String;

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "text_to_markdown",
            max_input_len: MAX_INPUT_LEN,
            supports_streaming: false,
        }
    }

    async fn run(&self, gateway: &Gateway, input: &str) -> String {
        let requirements = default_requirements("text_to_markdown");
        let opts = default_options(TIMEOUT);

        with_timeout(TIMEOUT, format_markdown(gateway, input, &requirements, &opts))
            .await
            .unwrap_or_else(|_| input.to_string())
    }
}

async fn format_markdown(
    gateway: &Gateway,
    input: &str,
    requirements: &TaskRequirements,
    opts: &GenerateOptions,
) -> crate::gateway::Result<String> {
    let provider = gateway.select(requirements)?;
    let prompt = format!("Reformat this plain text as clean Markdown, preserving meaning:\n{input}");
    Ok(provider.generate(&prompt, opts).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::gateway::tools::mock::MockProvider;
    use crate::gateway::{Capability, ModelProvider, ProviderMetadata};

    fn gateway() -> Gateway {
        let metadata = ProviderMetadata {
            id: "mock".to_string(),
            model_id: "mock-1".to_string(),
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
        let provider: Box<dyn ModelProvider> = Box::new(MockProvider::new(metadata));
        Gateway::new(vec![provider], GatewayConfig::default())
    }

    #[tokio::test]
    async fn formats_through_the_selected_provider() {
        let tool = MarkdownTool;
        let output = tool.run(&gateway(), "plain text").await;
        assert!(output.contains("plain text"));
    }

    #[tokio::test]
    async fn falls_back_to_raw_input_when_no_provider_is_registered() {
        let empty = Gateway::new(vec![], GatewayConfig::default());
        let tool = MarkdownTool;
        let output = tool.run(&empty, "plain text").await;
        assert_eq!(output, "plain text");
    }
}
