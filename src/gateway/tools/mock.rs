//! A deterministic provider stand-in for tests and the demo harness. Concrete
//! AI SDK integrations are out of scope (§1); this is the "local provider"
//! mentioned there.

use async_trait::async_trait;

use crate::gateway::{GenerateOptions, ModelProvider, ProviderMetadata, Result};

pub struct MockProvider {
    metadata: ProviderMetadata,
}

impl MockProvider {
    pub fn new(metadata: ProviderMetadata) -> Self {
        Self { metadata }
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn generate(&self, prompt: &str, _opts: &GenerateOptions) -> Result<String> {
        // Deterministic, content-free echo: good enough to exercise chunking,
        // merging, and fallback logic without a real model dependency.
        Ok(format!("[{}] {}", self.metadata.model_id, prompt.trim()))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; 8];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % vector.len()] += byte as f32 / 255.0;
        }
        Ok(vector)
    }

    async fn health(&self) -> bool {
        self.metadata.enabled
    }
}
