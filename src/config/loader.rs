//! Configuration Loader
//!
//! Environment-aware loading built on the `config` crate. Sources are layered
//! lowest to highest precedence:
//!
//! 1. built-in defaults
//! 2. `<config_dir>/user_ingest.yaml`
//! 3. `<config_dir>/user_ingest.<environment>.yaml`
//! 4. `USER_INGEST__SECTION__FIELD` environment variables
//!
//! Missing files are skipped, so a bare environment-variable setup works.

use std::env;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::IngestConfig;

const CONFIG_FILE_STEM: &str = "user_ingest";
const ENV_PREFIX: &str = "USER_INGEST";
const ENV_SEPARATOR: &str = "__";

/// Loaded configuration together with where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: IngestConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<ConfigManager> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<ConfigManager> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            config_directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::build_config(&config_directory, environment)?;
        config.validate()?;

        Ok(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        })
    }

    /// Log what was loaded. Call once logging is initialized.
    pub fn log_loaded(&self) {
        info!(
            environment = %self.environment,
            config_directory = %self.config_directory.display(),
            batch_size = self.config.consumer.batch_size,
            consumer_workers = self.config.consumer.worker_count,
            producer_workers = self.config.producer.worker_count,
            queue = %self.config.rabbitmq.queue_name,
            "⚙️ CONFIG: Configuration loaded successfully"
        );
        debug!(config = %self.debug_config(), "Effective configuration");
    }

    fn build_config(config_directory: &Path, environment: &str) -> ConfigResult<IngestConfig> {
        let base = config_directory.join(format!("{CONFIG_FILE_STEM}.yaml"));
        let overlay = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.yaml"));

        let settings = Config::builder()
            .add_source(File::from(base).required(false))
            .add_source(File::from(overlay).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR))
            .build()
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        settings
            .try_deserialize::<IngestConfig>()
            .map_err(ConfigurationError::deserialize_error)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Configuration as JSON with connection strings and key material masked
    pub fn debug_config(&self) -> serde_json::Value {
        let mut config_json = serde_json::json!(self.config);
        let sensitive_patterns = ["key", "url", "password", "secret"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        *val = match val {
                            serde_json::Value::String(s) if s.is_empty() => {
                                serde_json::Value::String("[EMPTY]".to_string())
                            }
                            _ => serde_json::Value::String("[MASKED]".to_string()),
                        };
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }

    /// Detect current environment from environment variables
    fn detect_environment() -> String {
        env::var("USER_INGEST_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}
