//! Provider definitions and communication methods.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Transport strategy used to reach a provider.
///
/// This is a closed set: every provider is reachable through exactly one of
/// these methods, and the transport layer has one implementation per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationMethod {
    /// Long-lived agent session speaking newline-delimited JSON-RPC over stdio.
    Acp,
    /// One-shot subprocess that takes the prompt as its final argument.
    Cli,
    /// Remote HTTP API.
    Api,
}

impl CommunicationMethod {
    /// Multiplier applied to cost estimates for this method.
    pub fn cost_factor(&self) -> f64 {
        match self {
            Self::Acp => 1.5,
            Self::Api => 1.0,
            Self::Cli => 0.5,
        }
    }

    /// Whether workers on this method accept follow-up prompts.
    pub fn is_session(&self) -> bool {
        matches!(self, Self::Acp)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acp => "acp",
            Self::Cli => "cli",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for CommunicationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommunicationMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "acp" => Ok(Self::Acp),
            "cli" => Ok(Self::Cli),
            "api" => Ok(Self::Api),
            _ => Err(CoreError::InvalidMethod(s.to_string())),
        }
    }
}

/// Pricing of a provider. Either rate may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    /// Price per 1k tokens.
    #[serde(default)]
    pub per_1k_tokens: Option<f64>,

    /// Price per hour of session time.
    #[serde(default)]
    pub per_hour: Option<f64>,
}

/// How to reach a provider. Which fields matter depends on the method:
/// ACP and CLI use `command`/`args`, API uses `endpoint`/`api_key_env`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSpec {
    /// Executable to run (ACP, CLI).
    pub command: Option<String>,

    /// Arguments placed before the prompt (CLI) or used as-is (ACP).
    pub args: Vec<String>,

    /// HTTP endpoint (API).
    pub endpoint: Option<String>,

    /// Environment variable holding the API key (API).
    pub api_key_env: Option<String>,

    /// Flag used to hand a per-worker config file to the process,
    /// e.g. `--mcp-config`.
    pub config_flag: Option<String>,

    /// Extra environment variables for spawned processes.
    pub env: HashMap<String, String>,
}

/// A provider entry from the externally supplied catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDefinition {
    /// Unique identity, e.g. "claude-acp".
    pub id: String,

    /// Communication method used to reach this provider.
    pub method: CommunicationMethod,

    /// Provider family (e.g. "claude", "gemini", "qwen"); drives cost scaling.
    pub provider_name: String,

    /// Backend model name.
    pub model: String,

    /// Pricing.
    #[serde(default)]
    pub cost: CostModel,

    /// Context window size in tokens.
    pub context_limit: u64,

    /// Free-text capability tags.
    #[serde(default)]
    pub best_for: Vec<String>,

    /// Launch settings.
    #[serde(default)]
    pub launch: LaunchSpec,
}

impl ProviderDefinition {
    /// Create a provider with minimal required fields.
    pub fn new(
        id: impl Into<String>,
        method: CommunicationMethod,
        provider_name: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            method,
            provider_name: provider_name.into(),
            model: model.into(),
            cost: CostModel::default(),
            context_limit: 0,
            best_for: Vec::new(),
            launch: LaunchSpec::default(),
        }
    }

    /// Builder method to set the context window.
    pub fn with_context_limit(mut self, tokens: u64) -> Self {
        self.context_limit = tokens;
        self
    }

    /// Builder method to add a capability tag.
    pub fn with_best_for(mut self, tag: impl Into<String>) -> Self {
        self.best_for.push(tag.into());
        self
    }

    /// Builder method to set the cost model.
    pub fn with_cost(mut self, cost: CostModel) -> Self {
        self.cost = cost;
        self
    }

    /// Builder method to run a command (ACP/CLI providers).
    pub fn with_command<I, S>(mut self, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.launch.command = Some(command.into());
        self.launch.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method to set an HTTP endpoint (API providers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.launch.endpoint = Some(endpoint.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse_is_case_insensitive() {
        assert_eq!("ACP".parse::<CommunicationMethod>().unwrap(), CommunicationMethod::Acp);
        assert_eq!(" cli ".parse::<CommunicationMethod>().unwrap(), CommunicationMethod::Cli);
        assert_eq!("Api".parse::<CommunicationMethod>().unwrap(), CommunicationMethod::Api);
    }

    #[test]
    fn test_method_parse_rejects_unknown() {
        let err = "grpc".parse::<CommunicationMethod>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidMethod(ref m) if m == "grpc"));
    }

    #[test]
    fn test_provider_deserializes_with_defaults() {
        let json = r#"{
            "id": "qwen-cli",
            "method": "cli",
            "provider_name": "qwen",
            "model": "qwen3-coder",
            "context_limit": 32000
        }"#;
        let provider: ProviderDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(provider.method, CommunicationMethod::Cli);
        assert!(provider.best_for.is_empty());
        assert!(provider.cost.per_1k_tokens.is_none());
        assert!(provider.launch.command.is_none());
    }

    #[test]
    fn test_method_factors() {
        assert_eq!(CommunicationMethod::Acp.cost_factor(), 1.5);
        assert_eq!(CommunicationMethod::Api.cost_factor(), 1.0);
        assert_eq!(CommunicationMethod::Cli.cost_factor(), 0.5);
    }
}
