//! Embedding tool (§4.3): thin wrapper over `ModelProvider::embed`, selected
//! like any other tool so provider choice still goes through the strategy.

use std::time::Duration;

use async_trait::async_trait;

use super::{Tool, ToolMetadata, default_requirements, with_timeout};
use crate::gateway::{Gateway, TaskRequirements};

const TIMEOUT: Duration = Duration::from_secs(20);
const MAX_INPUT_LEN: usize = 1_000_000;

pub struct EmbeddingTool;

#[async_trait]
impl Tool for EmbeddingTool {
    type Output = Vec<f32>;

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "embedding",
            max_input_len: MAX_INPUT_LEN,
            supports_streaming: false,
        }
    }

    async fn run(&self, gateway: &Gateway, input: &str) -> Vec<f32> {
        let requirements = default_requirements("embedding");
        with_timeout(TIMEOUT, embed(gateway, input, &requirements))
            .await
            .unwrap_or_default()
    }
}

async fn embed(gateway: &Gateway, input: &str, requirements: &TaskRequirements) -> crate::gateway::Result<Vec<f32>> {
    let provider = gateway.select(requirements)?;
    Ok(provider.embed(input).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::gateway::tools::mock::MockProvider;
    use crate::gateway::{Capability, ModelProvider, ProviderMetadata};

    #[tokio::test]
    async fn returns_empty_vector_when_no_provider_is_registered() {
        let empty = Gateway::new(vec![], GatewayConfig::default());
        let tool = EmbeddingTool;
        assert!(tool.run(&empty, "text").await.is_empty());
    }

    #[tokio::test]
    async fn embeds_via_the_selected_provider() {
        let metadata = ProviderMetadata {
            id: "mock".to_string(),
            model_id: "mock-1".to_string(),
            enabled: true,
            capabilities: vec![Capability::Embeddings],
            cost_tier: 1,
            cost_per_1k_input: 0.0,
            cost_per_1k_output: 0.0,
            avg_latency_ms: 10,
            max_context: 8192,
            quality_score: 0.5,
            preferred_for: vec![],
        };
        let provider: Box<dyn ModelProvider> = Box::new(MockProvider::new(metadata));
        let gateway = Gateway::new(vec![provider], GatewayConfig::default());

        let tool = EmbeddingTool;
        let vector = tool.run(&gateway, "some text").await;
        assert_eq!(vector.len(), 8);
    }
}
