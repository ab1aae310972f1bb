use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "DOCBENCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/docbench.toml";
const ENV_PREFIX: &str = "DOCBENCH";
const ENV_SEPARATOR: &str = "__";

/// Loads configuration from all sources, in priority order (lowest to highest):
/// struct defaults, an optional TOML file, a `.env` file, then process
/// environment variables prefixed `DOCBENCH__`.
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_sources(config_path)
}

/// Loads configuration from a specific path. Used by tests and by callers that
/// want to bypass the `DOCBENCH_CONFIG` environment lookup.
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("loading configuration from {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "no config file at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
