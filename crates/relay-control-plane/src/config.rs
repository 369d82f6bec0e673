//! Control plane configuration.
//!
//! A single JSON document carries the provider catalog, the router's cost
//! factors and the manager's supervision settings:
//!
//! ```json
//! {
//!   "providers": [
//!     { "id": "claude-acp", "method": "acp", "provider_name": "claude",
//!       "model": "claude-sonnet-4", "context_limit": 200000,
//!       "best_for": ["refactoring"], "launch": { "command": "claude-code-acp" } }
//!   ],
//!   "router": { "provider_factors": { "claude": 2.0 } },
//!   "manager": { "default_timeout_ms": 1800000 }
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use relay_core::{CommunicationMethod, ProviderDefinition};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::ProviderCatalog;
use crate::router::RouterConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Worker supervision settings. All durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Worker lifetime when a spawn request gives none, measured from start.
    pub default_timeout_ms: u64,

    /// Budget for starting a transport during spawn.
    pub connect_timeout_ms: u64,

    /// Period of the liveness probe.
    pub health_check_interval_ms: u64,

    /// Silence after which a worker is degraded.
    pub degraded_after_ms: u64,

    /// Silence after which a one-shot worker is unresponsive.
    pub unresponsive_after_ms: u64,

    /// Transient failures tolerated before a worker is failed.
    pub max_retries: u32,

    /// Base delay between API retries.
    pub retry_backoff_ms: u64,

    /// Per-request timeout for API providers.
    pub request_timeout_ms: u64,

    /// Time a stopped process gets to exit.
    pub stop_grace_ms: u64,

    /// How long a follow-up prompt waits for the session to take it.
    pub prompt_ack_timeout_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30 * 60 * 1000,
            connect_timeout_ms: 10_000,
            health_check_interval_ms: 30_000,
            degraded_after_ms: 60_000,
            unresponsive_after_ms: 180_000,
            max_retries: 3,
            retry_backoff_ms: 2_000,
            request_timeout_ms: 300_000,
            stop_grace_ms: 5_000,
            prompt_ack_timeout_ms: 10_000,
        }
    }
}

impl ManagerConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn degraded_after(&self) -> Duration {
        Duration::from_millis(self.degraded_after_ms)
    }

    pub fn unresponsive_after(&self) -> Duration {
        Duration::from_millis(self.unresponsive_after_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn prompt_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.prompt_ack_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("default_timeout_ms", self.default_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("health_check_interval_ms", self.health_check_interval_ms),
            ("request_timeout_ms", self.request_timeout_ms),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("manager.{} must be > 0", name)));
        }
        if self.unresponsive_after_ms < self.degraded_after_ms {
            return Err(ConfigError::Invalid(
                "manager.unresponsive_after_ms must be >= degraded_after_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Full Relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider catalog, in routing order.
    pub providers: Vec<ProviderDefinition>,

    /// Router settings.
    pub router: RouterConfig,

    /// Worker manager settings.
    pub manager: ManagerConfig,
}

impl Config {
    /// Read and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a config document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_providers(&self.providers)?;
        self.router.validate()?;
        self.manager.validate()
    }

    /// Build the catalog from the configured providers.
    pub fn catalog(&self) -> Result<ProviderCatalog, ConfigError> {
        ProviderCatalog::new(self.providers.clone())
    }
}

pub(crate) fn validate_providers(providers: &[ProviderDefinition]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for provider in providers {
        if provider.id.trim().is_empty() {
            return Err(ConfigError::Invalid("provider id must not be empty".to_string()));
        }
        if !seen.insert(provider.id.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate provider id '{}'",
                provider.id
            )));
        }
        if provider.context_limit == 0 {
            return Err(ConfigError::Invalid(format!(
                "provider '{}' has a zero context limit",
                provider.id
            )));
        }
        let negative = [provider.cost.per_1k_tokens, provider.cost.per_hour]
            .iter()
            .flatten()
            .any(|rate| *rate < 0.0);
        if negative {
            return Err(ConfigError::Invalid(format!(
                "provider '{}' has a negative cost",
                provider.id
            )));
        }
        match provider.method {
            CommunicationMethod::Acp | CommunicationMethod::Cli
                if provider.launch.command.is_none() =>
            {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' ({}) needs launch.command",
                    provider.id, provider.method
                )));
            }
            CommunicationMethod::Api if provider.launch.endpoint.is_none() => {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' (api) needs launch.endpoint",
                    provider.id
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "providers": [
            {
                "id": "claude-acp",
                "method": "acp",
                "provider_name": "claude",
                "model": "claude-sonnet-4",
                "cost": { "per_1k_tokens": 0.015 },
                "context_limit": 200000,
                "best_for": ["refactoring", "architecture"],
                "launch": { "command": "claude-code-acp" }
            },
            {
                "id": "gemini-api",
                "method": "api",
                "provider_name": "gemini",
                "model": "gemini-2.5-pro",
                "context_limit": 1000000,
                "launch": { "endpoint": "https://example.invalid/v1/chat", "api_key_env": "GEMINI_API_KEY" }
            }
        ],
        "manager": { "max_retries": 5 }
    }"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_json(SAMPLE).unwrap();
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.manager.max_retries, 5);
        // Unspecified fields keep their defaults.
        assert_eq!(config.manager.connect_timeout_ms, 10_000);
        assert_eq!(config.router.factor_for("claude"), 2.0);
        assert_eq!(config.catalog().unwrap().len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.providers[0].id, "claude-acp");
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/nonexistent/relay.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let provider = ProviderDefinition::new("dup", CommunicationMethod::Cli, "qwen", "m")
            .with_context_limit(1000)
            .with_command("qwen", Vec::<String>::new());
        let config = Config {
            providers: vec![provider.clone(), provider],
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate provider id"));
    }

    #[test]
    fn test_launch_requirements() {
        let api = ProviderDefinition::new("api", CommunicationMethod::Api, "gemini", "m")
            .with_context_limit(1000);
        assert!(validate_providers(&[api]).is_err());

        let cli = ProviderDefinition::new("cli", CommunicationMethod::Cli, "qwen", "m")
            .with_context_limit(1000);
        assert!(validate_providers(&[cli]).is_err());
    }

    #[test]
    fn test_manager_thresholds_validated() {
        let config = Config {
            manager: ManagerConfig {
                degraded_after_ms: 10_000,
                unresponsive_after_ms: 5_000,
                ..ManagerConfig::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
