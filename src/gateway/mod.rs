//! Model Gateway (C3): a uniform surface over AI providers, with strategy-based
//! selection and a static fallback chain (§4.3).
//!
//! Grounded on the teacher's `JobHandler` trait + `HandlerRegistry`-style static
//! dispatch (`handlers::default::DefaultHandler` registered by name, not by
//! runtime reflection) — the same shape is used here for `ModelProvider`
//! registration, per the "static registry, no dynamic decorator registration"
//! design note (§9).

pub mod tools;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{GatewayConfig, ProviderProfile, SelectionStrategy};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no provider satisfies the given requirements")]
    NoProviderAvailable,
    #[error("provider '{0}' is not registered")]
    UnknownProvider(String),
    #[error("provider call failed: {0}")]
    ProviderCall(String),
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    TextGen,
    Embeddings,
    Vision,
    FunctionCalling,
    LongContext,
    FastInference,
    JsonMode,
    Streaming,
    Batch,
}

#[derive(Debug, Clone)]
pub struct ProviderMetadata {
    pub id: String,
    pub model_id: String,
    pub enabled: bool,
    pub capabilities: Vec<Capability>,
    pub cost_tier: u8,
    pub cost_per_1k_input: f64,
    pub cost_per_1k_output: f64,
    pub avg_latency_ms: u64,
    pub max_context: usize,
    pub quality_score: f64,
    pub preferred_for: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskRequirements {
    pub max_latency_ms: Option<u64>,
    pub max_cost_tier: Option<u8>,
    pub min_quality: Option<f64>,
    pub required_context: Option<usize>,
    pub needs_vision: bool,
    pub needs_streaming: bool,
    pub needs_json_mode: bool,
    pub preferred_provider: Option<String>,
    /// The tool/task name, consulted for `manual` strategy overrides and the
    /// `balanced` strategy's `task_preference_bonus` term.
    pub task: Option<String>,
}

impl TaskRequirements {
    fn is_satisfied_by(&self, provider: &ProviderMetadata) -> bool {
        if !provider.enabled {
            return false;
        }
        if let Some(max_latency) = self.max_latency_ms {
            if provider.avg_latency_ms > max_latency {
                return false;
            }
        }
        if let Some(max_tier) = self.max_cost_tier {
            if provider.cost_tier > max_tier {
                return false;
            }
        }
        if let Some(min_quality) = self.min_quality {
            if provider.quality_score < min_quality {
                return false;
            }
        }
        if let Some(required_context) = self.required_context {
            if provider.max_context < required_context {
                return false;
            }
        }
        if self.needs_vision && !provider.capabilities.contains(&Capability::Vision) {
            return false;
        }
        if self.needs_streaming && !provider.capabilities.contains(&Capability::Streaming) {
            return false;
        }
        if self.needs_json_mode && !provider.capabilities.contains(&Capability::JsonMode) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: None,
            temperature: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A single AI backend. Concrete implementations (an HTTP-backed SDK client, a
/// local model runner) are outside this crate's scope (§1); `tools::mock`
/// supplies a deterministic stand-in used by tests and the demo harness.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn metadata(&self) -> &ProviderMetadata;
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<String>;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn health(&self) -> bool;
}

/// Static registry of providers, populated once at composition-root time.
pub struct Gateway {
    providers: HashMap<String, Box<dyn ModelProvider>>,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(providers: Vec<Box<dyn ModelProvider>>, config: GatewayConfig) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.metadata().id.clone(), p))
            .collect();
        Self { providers, config }
    }

    pub fn provider(&self, id: &str) -> Result<&dyn ModelProvider> {
        self.providers
            .get(id)
            .map(|p| p.as_ref())
            .ok_or_else(|| GatewayError::UnknownProvider(id.to_string()))
    }

    /// Picks a provider for `requirements` under the configured strategy,
    /// falling through `fallback_chain` then `default_provider` if the primary
    /// candidate set is empty (§4.3 step 4).
    pub fn select(&self, requirements: &TaskRequirements) -> Result<&dyn ModelProvider> {
        if self.config.selection_strategy == SelectionStrategy::Manual {
            if let Some(task) = &requirements.task {
                if let Some(provider_id) = self.config.task_model_overrides.get(task) {
                    if let Ok(provider) = self.provider(provider_id) {
                        if requirements.is_satisfied_by(provider.metadata()) {
                            return Ok(provider);
                        }
                    }
                }
            }
        }

        let mut candidates: Vec<&dyn ModelProvider> = self
            .providers
            .values()
            .map(|p| p.as_ref())
            .filter(|p| requirements.is_satisfied_by(p.metadata()))
            .collect();

        if candidates.is_empty() {
            return self.select_from_fallback(requirements);
        }

        rank(&mut candidates, self.config.selection_strategy, requirements);
        info!(provider = candidates[0].metadata().id, "selected provider");
        Ok(candidates[0])
    }

    fn select_from_fallback(&self, requirements: &TaskRequirements) -> Result<&dyn ModelProvider> {
        for id in &self.config.fallback_chain {
            if let Ok(provider) = self.provider(id) {
                if requirements.is_satisfied_by(provider.metadata()) {
                    warn!(provider = id, "primary selection empty, using fallback chain");
                    return Ok(provider);
                }
            }
        }
        if let Some(default_id) = &self.config.default_provider {
            if let Ok(provider) = self.provider(default_id) {
                warn!(provider = default_id, "using configured default provider");
                return Ok(provider);
            }
        }
        Err(GatewayError::NoProviderAvailable)
    }
}

fn rank(
    candidates: &mut [&dyn ModelProvider],
    strategy: SelectionStrategy,
    requirements: &TaskRequirements,
) {
    match strategy {
        SelectionStrategy::Cost => candidates.sort_by(|a, b| {
            total_cost(a.metadata())
                .partial_cmp(&total_cost(b.metadata()))
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        SelectionStrategy::Quality => candidates.sort_by(|a, b| {
            b.metadata()
                .quality_score
                .partial_cmp(&a.metadata().quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        SelectionStrategy::Latency => {
            candidates.sort_by_key(|p| p.metadata().avg_latency_ms);
        }
        SelectionStrategy::Balanced => candidates.sort_by(|a, b| {
            balanced_score(b.metadata(), requirements)
                .partial_cmp(&balanced_score(a.metadata(), requirements))
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        SelectionStrategy::Manual => {}
    }
}

fn total_cost(provider: &ProviderMetadata) -> f64 {
    provider.cost_per_1k_input + provider.cost_per_1k_output
}

/// `0.4*quality + 0.3*cost_score + 0.2*latency_score + 0.1*task_preference_bonus`,
/// per §4.3's balanced strategy.
fn balanced_score(provider: &ProviderMetadata, requirements: &TaskRequirements) -> f64 {
    let cost_score = 1.0 / (1.0 + total_cost(provider));
    let latency_score = 1.0 / (1.0 + provider.avg_latency_ms as f64 / 1000.0);
    let task_preference_bonus = match &requirements.task {
        Some(task) if provider.preferred_for.iter().any(|t| t == task) => 1.0,
        _ => 0.0,
    };
    0.4 * provider.quality_score + 0.3 * cost_score + 0.2 * latency_score + 0.1 * task_preference_bonus
}

/// Builds `ProviderMetadata` from a config entry, parsing its declared
/// capability strings (unrecognized ones are dropped with a warning).
pub fn metadata_from_profile(id: &str, profile: &ProviderProfile) -> ProviderMetadata {
    let capabilities = profile
        .capabilities
        .iter()
        .filter_map(|s| parse_capability(s))
        .collect();

    ProviderMetadata {
        id: id.to_string(),
        model_id: profile.model_id.clone(),
        enabled: profile.enabled,
        capabilities,
        cost_tier: profile.cost_tier,
        cost_per_1k_input: profile.cost_per_1k_input,
        cost_per_1k_output: profile.cost_per_1k_output,
        avg_latency_ms: profile.avg_latency_ms,
        max_context: profile.max_context,
        quality_score: profile.quality_score,
        preferred_for: profile.preferred_for.clone(),
    }
}

fn parse_capability(s: &str) -> Option<Capability> {
    match s {
        "text-gen" => Some(Capability::TextGen),
        "embeddings" => Some(Capability::Embeddings),
        "vision" => Some(Capability::Vision),
        "function-calling" => Some(Capability::FunctionCalling),
        "long-context" => Some(Capability::LongContext),
        "fast-inference" => Some(Capability::FastInference),
        "json-mode" => Some(Capability::JsonMode),
        "streaming" => Some(Capability::Streaming),
        "batch" => Some(Capability::Batch),
        other => {
            warn!(capability = other, "unrecognized provider capability, skipping");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tools::mock::MockProvider;

    fn provider(id: &str, quality: f64, cost: f64, latency_ms: u64) -> Box<dyn ModelProvider> {
        Box::new(MockProvider::new(ProviderMetadata {
            id: id.to_string(),
            model_id: format!("{id}-model"),
            enabled: true,
            capabilities: vec![Capability::TextGen],
            cost_tier: 1,
            cost_per_1k_input: cost,
            cost_per_1k_output: cost,
            avg_latency_ms: latency_ms,
            max_context: 8192,
            quality_score: quality,
            preferred_for: vec![],
        }))
    }

    #[test]
    fn cost_strategy_picks_cheapest() {
        let gateway = Gateway::new(
            vec![provider("expensive", 0.9, 10.0, 500), provider("cheap", 0.5, 1.0, 500)],
            GatewayConfig {
                selection_strategy: SelectionStrategy::Cost,
                ..Default::default()
            },
        );
        let selected = gateway.select(&TaskRequirements::default()).unwrap();
        assert_eq!(selected.metadata().id, "cheap");
    }

    #[test]
    fn quality_strategy_picks_highest_quality() {
        let gateway = Gateway::new(
            vec![provider("good", 0.9, 5.0, 500), provider("poor", 0.3, 1.0, 500)],
            GatewayConfig {
                selection_strategy: SelectionStrategy::Quality,
                ..Default::default()
            },
        );
        let selected = gateway.select(&TaskRequirements::default()).unwrap();
        assert_eq!(selected.metadata().id, "good");
    }

    #[test]
    fn requirements_filter_out_unfit_providers() {
        let gateway = Gateway::new(
            vec![provider("slow", 0.9, 1.0, 5000)],
            GatewayConfig {
                fallback_chain: vec![],
                ..Default::default()
            },
        );
        let requirements = TaskRequirements {
            max_latency_ms: Some(100),
            ..Default::default()
        };
        assert!(matches!(
            gateway.select(&requirements),
            Err(GatewayError::NoProviderAvailable)
        ));
    }

    #[test]
    fn falls_back_to_default_provider_when_no_candidate_fits() {
        let gateway = Gateway::new(
            vec![provider("slow", 0.9, 1.0, 5000)],
            GatewayConfig {
                default_provider: Some("slow".to_string()),
                ..Default::default()
            },
        );
        let requirements = TaskRequirements {
            max_latency_ms: Some(100),
            ..Default::default()
        };
        let selected = gateway.select(&requirements).unwrap();
        assert_eq!(selected.metadata().id, "slow");
    }

    #[test]
    fn manual_strategy_honors_task_override() {
        let gateway = Gateway::new(
            vec![provider("a", 0.5, 1.0, 500), provider("b", 0.9, 5.0, 500)],
            GatewayConfig {
                selection_strategy: SelectionStrategy::Manual,
                task_model_overrides: HashMap::from([("summarization".to_string(), "a".to_string())]),
                ..Default::default()
            },
        );
        let requirements = TaskRequirements {
            task: Some("summarization".to_string()),
            ..Default::default()
        };
        let selected = gateway.select(&requirements).unwrap();
        assert_eq!(selected.metadata().id, "a");
    }
}
