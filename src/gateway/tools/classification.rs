//! Document classification tool (§4.3): assigns the input one label from a
//! caller-supplied closed set.

use std::time::Duration;

use async_trait::async_trait;

use super::{Tool, ToolMetadata, default_options, default_requirements, with_timeout};
use crate::gateway::{Gateway, GenerateOptions, TaskRequirements};

const TIMEOUT: Duration = Duration::from_secs(30);
const MAX_INPUT_LEN: usize = 10_000;

pub struct ClassificationTool {
    pub labels: Vec<String>,
}

#[async_trait]
impl Tool for ClassificationTool {
    type Output = String;

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "classification",
            max_input_len: MAX_INPUT_LEN,
            supports_streaming: false,
        }
    }

    async fn run(&self, gateway: &Gateway, input: &str) -> String {
        let truncated: String = input.chars().take(MAX_INPUT_LEN).collect();
        let requirements = default_requirements("classification");
        let opts = default_options(TIMEOUT);

        let result = with_timeout(
            TIMEOUT,
            classify(gateway, &truncated, &self.labels, &requirements, &opts),
        )
        .await;

        match result {
            Ok(label) if self.labels.iter().any(|l| l == &label) => label,
            _ => self.labels.first().cloned().unwrap_or_default(),
        }
    }
}

async fn classify(
    gateway: &Gateway,
    truncated: &str,
    labels: &[String],
    requirements: &TaskRequirements,
    opts: &GenerateOptions,
) -> crate::gateway::Result<String> {
    let provider = gateway.select(requirements)?;
    let prompt = format!(
        "Classify this text as exactly one of [{}], respond with only the label:\n{truncated}",
        labels.join(", ")
    );
    Ok(provider.generate(&prompt, opts).await?.trim().to_string())
}
