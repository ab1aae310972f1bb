//! Question answering tool (§4.3): answers a question grounded in a supplied
//! document context.

use std::time::Duration;

use async_trait::async_trait;

use super::{Tool, ToolMetadata, default_options, default_requirements, with_timeout};
use crate::gateway::{Gateway, GenerateOptions, TaskRequirements};

const TIMEOUT: Duration = Duration::from_secs(30);
const MAX_INPUT_LEN: usize = 1_000_000;

pub struct QuestionAnsweringTool {
    pub question: String,
}

#[async_trait]
impl Tool for QuestionAnsweringTool {
    type Output = String;

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "question_answering",
            max_input_len: MAX_INPUT_LEN,
            supports_streaming: false,
        }
    }

    async fn run(&self, gateway: &Gateway, context: &str) -> String {
        let requirements = default_requirements("question_answering");
        let opts = default_options(TIMEOUT);

        with_timeout(TIMEOUT, answer(gateway, context, &self.question, &requirements, &opts))
            .await
            .unwrap_or_else(|_| "unable to answer within the time budget".to_string())
    }
}

async fn answer(
    gateway: &Gateway,
    context: &str,
    question: &str,
    requirements: &TaskRequirements,
    opts: &GenerateOptions,
) -> crate::gateway::Result<String> {
    let provider = gateway.select(requirements)?;
    let prompt = format!("Context:\n{context}\n\nQuestion: {question}\nAnswer concisely:");
    Ok(provider.generate(&prompt, opts).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::gateway::tools::mock::MockProvider;
    use crate::gateway::{Capability, ModelProvider, ProviderMetadata};

    #[tokio::test]
    async fn falls_back_when_no_provider_is_registered() {
        let empty = Gateway::new(vec![], GatewayConfig::default());
        let tool = QuestionAnsweringTool {
            question: "who wrote this?".to_string(),
        };
        let answer = tool.run(&empty, "document context").await;
        assert_eq!(answer, "unable to answer within the time budget");
    }

    #[tokio::test]
    async fn answers_via_the_selected_provider() {
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
        let gateway = Gateway::new(vec![provider], GatewayConfig::default());

        let tool = QuestionAnsweringTool {
            question: "what is this about?".to_string(),
        };
        let answer = tool.run(&gateway, "a document about cats").await;
        assert!(answer.contains("what is this about?"));
    }
}
