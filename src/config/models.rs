use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level configuration for the platform composition root.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Document Store backend selection (§6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Filesystem,
    Redis,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: std::path::PathBuf,
    pub redis_url: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
            redis_url: None,
        }
    }
}

fn default_store_path() -> std::path::PathBuf {
    std::path::PathBuf::from("data/documents")
}

/// Queue configuration (§6.5), mirrored onto `crate::queue::QueueConfig` at
/// composition-root time.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueSettings {
    #[serde(default)]
    pub backend: crate::queue::QueueBackend,
    pub redis_url: Option<String>,
    #[serde(default = "default_max_concurrent_workers")]
    pub max_concurrent_workers: usize,
    #[serde(default = "default_processing_timeout_secs")]
    pub processing_timeout_secs: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_stale_job_check_interval_secs")]
    pub stale_job_check_interval_secs: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_stale_worker_timeout_secs")]
    pub stale_worker_timeout_secs: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            backend: crate::queue::QueueBackend::default(),
            redis_url: None,
            max_concurrent_workers: default_max_concurrent_workers(),
            processing_timeout_secs: default_processing_timeout_secs(),
            retry_max_attempts: default_retry_max_attempts(),
            stale_job_check_interval_secs: default_stale_job_check_interval_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            stale_worker_timeout_secs: default_stale_worker_timeout_secs(),
        }
    }
}

impl From<QueueSettings> for crate::queue::QueueConfig {
    fn from(s: QueueSettings) -> Self {
        Self {
            backend: s.backend,
            redis_url: s.redis_url,
            max_concurrent_workers: s.max_concurrent_workers,
            processing_timeout_secs: s.processing_timeout_secs,
            retry_max_attempts: s.retry_max_attempts,
            stale_job_check_interval_secs: s.stale_job_check_interval_secs,
            heartbeat_interval_secs: s.heartbeat_interval_secs,
            stale_worker_timeout_secs: s.stale_worker_timeout_secs,
        }
    }
}

fn default_max_concurrent_workers() -> usize {
    3
}
fn default_processing_timeout_secs() -> u64 {
    300
}
fn default_retry_max_attempts() -> u32 {
    3
}
fn default_stale_job_check_interval_secs() -> u64 {
    60
}
fn default_heartbeat_interval_secs() -> u64 {
    30
}
fn default_stale_worker_timeout_secs() -> u64 {
    120
}

/// Strategy used to rank candidate providers (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectionStrategy {
    Cost,
    Quality,
    Latency,
    #[default]
    Balanced,
    Manual,
}

/// Per-provider cost/capability profile (§4.3, §6.5).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderProfile {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub model_id: String,
    #[serde(default)]
    pub cost_per_1k_input: f64,
    #[serde(default)]
    pub cost_per_1k_output: f64,
    #[serde(default = "default_cost_tier")]
    pub cost_tier: u8,
    #[serde(default = "default_avg_latency_ms")]
    pub avg_latency_ms: u64,
    #[serde(default = "default_max_context")]
    pub max_context: usize,
    #[serde(default = "default_quality_score")]
    pub quality_score: f64,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub preferred_for: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_cost_tier() -> u8 {
    1
}
fn default_avg_latency_ms() -> u64 {
    1000
}
fn default_max_context() -> usize {
    8192
}
fn default_quality_score() -> f64 {
    0.5
}

impl Default for ProviderProfile {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            model_id: String::new(),
            cost_per_1k_input: 0.0,
            cost_per_1k_output: 0.0,
            cost_tier: default_cost_tier(),
            avg_latency_ms: default_avg_latency_ms(),
            max_context: default_max_context(),
            quality_score: default_quality_score(),
            capabilities: Vec::new(),
            preferred_for: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GatewayConfig {
    pub default_provider: Option<String>,
    #[serde(default)]
    pub selection_strategy: SelectionStrategy,
    #[serde(default)]
    pub providers: HashMap<String, ProviderProfile>,
    #[serde(default)]
    pub task_model_overrides: HashMap<String, String>,
    #[serde(default)]
    pub fallback_chain: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_filesystem_store_and_memory_queue() {
        let config = Config::default();
        assert_eq!(config.store.backend, StoreBackend::Filesystem);
        assert_eq!(config.queue.max_concurrent_workers, 3);
        assert_eq!(config.queue.processing_timeout_secs, 300);
    }

    #[test]
    fn queue_settings_convert_into_queue_config() {
        let settings = QueueSettings::default();
        let converted: crate::queue::QueueConfig = settings.into();
        assert_eq!(converted.retry_max_attempts, 3);
    }
}
