//! Layered configuration for docbench.
//!
//! Loads settings from, in ascending priority:
//! 1. Struct defaults (embedded via `#[serde(default)]`)
//! 2. An optional TOML file (`config/docbench.toml`, or `DOCBENCH_CONFIG`)
//! 3. A `.env` file (via `dotenvy`)
//! 4. Process environment variables prefixed `DOCBENCH__`, `__`-separated
//!    (e.g. `DOCBENCH__QUEUE__MAX_CONCURRENT_WORKERS=8`)

mod models;
mod sources;
mod validation;

pub use models::{
    Config, GatewayConfig, ProviderProfile, SelectionStrategy, StoreBackend, StoreConfig,
    QueueSettings,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("configuration validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl Config {
    /// Loads configuration from all sources and validates it.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Loads configuration from a specific TOML path, bypassing the
    /// `DOCBENCH_CONFIG` environment lookup. Used by tests and the demo binary.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_from_path_validates_the_result() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("bad.toml");
        fs::write(
            &config_path,
            r#"
[gateway]
default_provider = "ghost"
"#,
        )
        .unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result,
            Err(ConfigError::Validation(ValidationError::UnknownDefaultProvider(_)))
        ));
    }

    #[test]
    fn load_from_path_accepts_minimal_valid_config() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("good.toml");
        fs::write(&config_path, "[store]\nbackend = \"filesystem\"\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Filesystem);
    }
}
