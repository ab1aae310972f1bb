//! Entity extraction tool (§4.3): chunks long input, calls the model per
//! chunk, and merges results by deduplicating `(text.lower, type)` pairs,
//! keeping the maximum confidence seen.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Tool, ToolMetadata, chunk, default_options, default_requirements, with_timeout};
use crate::gateway::{Gateway, GenerateOptions, TaskRequirements};

const TIMEOUT: Duration = Duration::from_secs(30);
const MAX_INPUT_LEN: usize = 1_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: f32,
}

pub struct EntityExtractionTool;

#[async_trait]
impl Tool for EntityExtractionTool {
    type Output = Vec<Entity>;

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "entity_extraction",
            max_input_len: MAX_INPUT_LEN,
            supports_streaming: false,
        }
    }

    async fn run(&self, gateway: &Gateway, input: &str) -> Vec<Entity> {
        let requirements = default_requirements("entity_extraction");
        let opts = default_options(TIMEOUT);

        let mut per_chunk = Vec::new();
        for piece in chunk(input) {
            let entities = match with_timeout(TIMEOUT, extract(gateway, piece, &requirements, &opts)).await
            {
                Ok(entities) => entities,
                Err(_) => Vec::new(),
            };
            per_chunk.push(entities);
        }
        merge(per_chunk)
    }
}

async fn extract(
    gateway: &Gateway,
    piece: &str,
    requirements: &TaskRequirements,
    opts: &GenerateOptions,
) -> crate::gateway::Result<Vec<Entity>> {
    let provider = gateway.select(requirements)?;
    let prompt = format!(
        "Extract named entities from this text as a JSON array of {{text, type, confidence}}:\n{piece}"
    );
    let response = provider.generate(&prompt, opts).await?;
    Ok(serde_json::from_str(&response).unwrap_or_default())
}

/// Deduplicates by `(text.lower, type)`, keeping the maximum confidence.
fn merge(chunks: Vec<Vec<Entity>>) -> Vec<Entity> {
    let mut best: HashMap<(String, String), Entity> = HashMap::new();
    for entity in chunks.into_iter().flatten() {
        let key = (entity.text.to_lowercase(), entity.kind.clone());
        best.entry(key)
            .and_modify(|existing| {
                if entity.confidence > existing.confidence {
                    *existing = entity.clone();
                }
            })
            .or_insert(entity);
    }
    best.into_values().collect()
}
