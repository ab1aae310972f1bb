use super::models::{Config, StoreBackend};
use crate::queue::QueueBackend;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("store backend is redis but no redis_url was configured")]
    MissingStoreRedisUrl,

    #[error("queue backend is redis but no redis_url was configured")]
    MissingQueueRedisUrl,

    #[error("max_concurrent_workers must be at least 1")]
    InvalidWorkerCount,

    #[error("gateway default_provider '{0}' is not a registered provider")]
    UnknownDefaultProvider(String),

    #[error("fallback_chain references unregistered provider '{0}'")]
    UnknownFallbackProvider(String),

    #[error("fallback_chain contains duplicate entry '{0}', which would loop forever")]
    DuplicateFallbackEntry(String),

    #[error("task_model_overrides['{task}'] references unregistered provider '{provider}'")]
    UnknownOverrideProvider { task: String, provider: String },
}

/// Validates the entire configuration. Run once after loading, before the
/// composition root wires any component.
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_store(config)?;
    validate_queue(config)?;
    validate_gateway(config)?;
    Ok(())
}

fn validate_store(config: &Config) -> Result<(), ValidationError> {
    if config.store.backend == StoreBackend::Redis && config.store.redis_url.is_none() {
        return Err(ValidationError::MissingStoreRedisUrl);
    }
    Ok(())
}

fn validate_queue(config: &Config) -> Result<(), ValidationError> {
    if config.queue.backend == QueueBackend::Redis && config.queue.redis_url.is_none() {
        return Err(ValidationError::MissingQueueRedisUrl);
    }
    if config.queue.max_concurrent_workers == 0 {
        return Err(ValidationError::InvalidWorkerCount);
    }
    Ok(())
}

/// Checks provider references for dangling names and the fallback chain for
/// entries that would cause selection to loop indefinitely (a provider
/// appearing more than once).
fn validate_gateway(config: &Config) -> Result<(), ValidationError> {
    let gateway = &config.gateway;

    if let Some(default) = &gateway.default_provider {
        if !gateway.providers.contains_key(default) {
            return Err(ValidationError::UnknownDefaultProvider(default.clone()));
        }
    }

    let mut seen = HashSet::new();
    for provider in &gateway.fallback_chain {
        if !gateway.providers.contains_key(provider) {
            return Err(ValidationError::UnknownFallbackProvider(provider.clone()));
        }
        if !seen.insert(provider.clone()) {
            return Err(ValidationError::DuplicateFallbackEntry(provider.clone()));
        }
    }

    for (task, provider) in &gateway.task_model_overrides {
        if !gateway.providers.contains_key(provider) {
            return Err(ValidationError::UnknownOverrideProvider {
                task: task.clone(),
                provider: provider.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::{GatewayConfig, ProviderProfile, QueueSettings, StoreConfig};
    use std::collections::HashMap;

    fn provider(model_id: &str) -> ProviderProfile {
        ProviderProfile {
            enabled: true,
            model_id: model_id.to_string(),
            cost_per_1k_input: 0.0,
            cost_per_1k_output: 0.0,
            cost_tier: 1,
            avg_latency_ms: 500,
            max_context: 8192,
            quality_score: 0.7,
            capabilities: vec![],
            preferred_for: vec![],
        }
    }

    fn base_config() -> Config {
        Config {
            store: StoreConfig::default(),
            queue: QueueSettings::default(),
            gateway: GatewayConfig::default(),
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn redis_store_without_url_is_rejected() {
        let mut config = base_config();
        config.store.backend = StoreBackend::Redis;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::MissingStoreRedisUrl)
        ));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut config = base_config();
        config.queue.max_concurrent_workers = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidWorkerCount)
        ));
    }

    #[test]
    fn unknown_default_provider_is_rejected() {
        let mut config = base_config();
        config.gateway.default_provider = Some("ghost".to_string());
        assert!(matches!(
            validate(&config),
            Err(ValidationError::UnknownDefaultProvider(_))
        ));
    }

    #[test]
    fn fallback_chain_with_unregistered_provider_is_rejected() {
        let mut config = base_config();
        config.gateway.fallback_chain = vec!["ghost".to_string()];
        assert!(matches!(
            validate(&config),
            Err(ValidationError::UnknownFallbackProvider(_))
        ));
    }

    #[test]
    fn duplicate_fallback_entry_is_rejected() {
        let mut config = base_config();
        config
            .gateway
            .providers
            .insert("haiku".to_string(), provider("claude-haiku-4"));
        config.gateway.fallback_chain = vec!["haiku".to_string(), "haiku".to_string()];
        assert!(matches!(
            validate(&config),
            Err(ValidationError::DuplicateFallbackEntry(_))
        ));
    }

    #[test]
    fn override_referencing_unregistered_provider_is_rejected() {
        let mut config = base_config();
        let mut overrides = HashMap::new();
        overrides.insert("summarization".to_string(), "ghost".to_string());
        config.gateway.task_model_overrides = overrides;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::UnknownOverrideProvider { .. })
        ));
    }
}
