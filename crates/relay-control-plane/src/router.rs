//! Router - recommends a provider for a task.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use relay_core::{
    Alternative, CommunicationMethod, Complexity, ProviderDefinition, RouteRequest,
    RoutingDecision, Task,
};

use crate::catalog::ProviderCatalog;
use crate::config::ConfigError;

/// Most alternatives a decision carries.
pub const MAX_ALTERNATIVES: usize = 3;

const LARGE_CONTEXT: u64 = 100_000;
const TAG_SCORE: i64 = 10;
const PRIORITY_SCORE: i64 = 2;

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("No providers configured")]
    NoProviders,

    #[error("Invalid task: {0}")]
    InvalidTask(String),
}

/// Router settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Cost factor per provider family. Families not listed use 1.0.
    pub provider_factors: HashMap<String, f64>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let provider_factors = [("claude", 2.0), ("gemini", 1.0), ("qwen", 0.5)]
            .into_iter()
            .map(|(name, factor)| (name.to_string(), factor))
            .collect();
        Self { provider_factors }
    }
}

impl RouterConfig {
    /// Cost factor for a provider family.
    pub fn factor_for(&self, provider_name: &str) -> f64 {
        self.provider_factors
            .get(&provider_name.to_lowercase())
            .copied()
            .unwrap_or(1.0)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        match self.provider_factors.iter().find(|(_, f)| **f < 0.0 || !f.is_finite()) {
            Some((name, factor)) => Err(ConfigError::Invalid(format!(
                "router.provider_factors.{} must be a non-negative number, got {}",
                name, factor
            ))),
            None => Ok(()),
        }
    }
}

/// Base cost for a token estimate.
pub fn base_cost(tokens: u64) -> f64 {
    match tokens {
        t if t > 100_000 => 0.05,
        t if t > 50_000 => 0.03,
        t if t > 20_000 => 0.02,
        _ => 0.01,
    }
}

/// Provider router.
pub struct Router {
    catalog: Arc<ProviderCatalog>,
    config: RouterConfig,
}

struct Candidate<'a> {
    provider: &'a ProviderDefinition,
    score: i64,
    matched: Vec<&'a str>,
}

impl Router {
    /// Create a new Router.
    pub fn new(catalog: Arc<ProviderCatalog>, config: RouterConfig) -> Self {
        Self { catalog, config }
    }

    /// Route a flat tool-layer request.
    pub fn route_request(&self, request: RouteRequest) -> Result<RoutingDecision, RouterError> {
        self.route(&request.into_task())
    }

    /// Pick a provider for the task and rank alternatives to it.
    pub fn route(&self, task: &Task) -> Result<RoutingDecision, RouterError> {
        if task.description.trim().is_empty() {
            return Err(RouterError::InvalidTask(
                "task description must not be empty".to_string(),
            ));
        }

        let tokens = task.estimated_tokens();
        let base = base_cost(tokens);

        let (chosen, reason) = match self.best_fit(task, tokens) {
            Some(candidate) => {
                let reason = self.explain(&candidate, task, tokens);
                (candidate.provider, reason)
            }
            None => {
                let largest = self.largest().ok_or(RouterError::NoProviders)?;
                let reason = format!(
                    "no provider fits ~{} tokens; {} has the largest context window ({})",
                    tokens, largest.id, largest.context_limit
                );
                (largest, reason)
            }
        };

        let estimated_cost = base * self.cost_multiplier(chosen);
        let alternatives = self.alternatives(chosen, base, estimated_cost);

        info!(
            provider = %chosen.id,
            method = %chosen.method,
            tokens,
            estimated_cost,
            alternatives = alternatives.len(),
            "Routed task"
        );

        Ok(RoutingDecision {
            provider: chosen.id.clone(),
            model: chosen.model.clone(),
            method: chosen.method,
            reason,
            estimated_cost,
            alternatives,
        })
    }

    /// Method factor times provider-family factor.
    pub fn cost_multiplier(&self, provider: &ProviderDefinition) -> f64 {
        provider.method.cost_factor() * self.config.factor_for(&provider.provider_name)
    }

    fn best_fit<'a>(&'a self, task: &Task, tokens: u64) -> Option<Candidate<'a>> {
        let text = match task.capability() {
            Some(hint) => format!("{} {}", task.description, hint),
            None => task.description.clone(),
        }
        .to_lowercase();

        let mut best: Option<Candidate<'a>> = None;
        for provider in self.catalog.iter().filter(|p| p.context_limit >= tokens) {
            let matched: Vec<&str> = provider
                .best_for
                .iter()
                .map(|tag| tag.trim())
                .filter(|tag| !tag.is_empty() && text.contains(&tag.to_lowercase()))
                .collect();
            let score = matched.len() as i64 * TAG_SCORE + hint_score(provider.method, task);
            debug!(provider = %provider.id, score, "Scored candidate");

            // Strictly greater, so ties keep catalog order.
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(Candidate {
                    provider,
                    score,
                    matched,
                });
            }
        }
        best
    }

    fn largest(&self) -> Option<&ProviderDefinition> {
        self.catalog.iter().reduce(|best, p| {
            if p.context_limit > best.context_limit {
                p
            } else {
                best
            }
        })
    }

    fn explain(&self, candidate: &Candidate<'_>, task: &Task, tokens: u64) -> String {
        let provider = candidate.provider;
        let mut parts = Vec::new();
        if !candidate.matched.is_empty() {
            parts.push(format!("matches {}", candidate.matched.join(", ")));
        }
        parts.push(format!(
            "fits ~{} tokens in a {} token window",
            tokens, provider.context_limit
        ));
        if let Some(complexity) = task.complexity() {
            parts.push(format!("{:?} complexity", complexity).to_lowercase());
        }
        if task.priority().is_some_and(|p| p.is_elevated()) {
            parts.push("elevated priority".to_string());
        }
        format!("{} via {}: {}", provider.id, provider.method, parts.join("; "))
    }

    fn alternatives(
        &self,
        chosen: &ProviderDefinition,
        base: f64,
        chosen_cost: f64,
    ) -> Vec<Alternative> {
        self.catalog
            .iter()
            .filter(|p| p.id != chosen.id)
            .take(MAX_ALTERNATIVES)
            .map(|p| {
                let estimated_cost = base * self.cost_multiplier(p);
                let reason = if estimated_cost < chosen_cost {
                    "cheaper option"
                } else if p.context_limit > LARGE_CONTEXT {
                    "larger context window"
                } else {
                    "alternative provider"
                };
                Alternative {
                    provider: p.id.clone(),
                    model: p.model.clone(),
                    method: p.method,
                    estimated_cost,
                    reason: reason.to_string(),
                }
            })
            .collect()
    }
}

fn hint_score(method: CommunicationMethod, task: &Task) -> i64 {
    let complexity = match (task.complexity(), method) {
        (Some(Complexity::High), CommunicationMethod::Acp) => 3,
        (Some(Complexity::High), CommunicationMethod::Api) => 2,
        (Some(Complexity::High), CommunicationMethod::Cli) => 1,
        (Some(Complexity::Low), CommunicationMethod::Cli) => 3,
        (Some(Complexity::Low), CommunicationMethod::Api) => 2,
        (Some(Complexity::Low), CommunicationMethod::Acp) => 1,
        _ => 0,
    };
    let priority = match task.priority() {
        Some(p) if p.is_elevated() && method == CommunicationMethod::Api => PRIORITY_SCORE,
        _ => 0,
    };
    complexity + priority
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::task::{META_CAPABILITY, META_COMPLEXITY, META_PRIORITY};

    fn provider(
        id: &str,
        method: CommunicationMethod,
        family: &str,
        limit: u64,
    ) -> ProviderDefinition {
        let provider = ProviderDefinition::new(id, method, family, format!("{}-model", family))
            .with_context_limit(limit);
        match method {
            CommunicationMethod::Api => provider.with_endpoint("http://localhost/v1"),
            _ => provider.with_command(family, Vec::<String>::new()),
        }
    }

    fn catalog() -> Arc<ProviderCatalog> {
        Arc::new(
            ProviderCatalog::new(vec![
                provider("claude-acp", CommunicationMethod::Acp, "claude", 200_000)
                    .with_best_for("refactoring"),
                provider("gemini-api", CommunicationMethod::Api, "gemini", 1_000_000)
                    .with_best_for("large context"),
                provider("qwen-cli", CommunicationMethod::Cli, "qwen", 32_000)
                    .with_best_for("quick fixes"),
                provider("claude-cli", CommunicationMethod::Cli, "claude", 200_000),
                provider("local-api", CommunicationMethod::Api, "llama", 8_000),
            ])
            .unwrap(),
        )
    }

    fn router() -> Router {
        Router::new(catalog(), RouterConfig::default())
    }

    #[test]
    fn test_base_cost_tiers() {
        assert_eq!(base_cost(0), 0.01);
        assert_eq!(base_cost(20_000), 0.01);
        assert_eq!(base_cost(20_001), 0.02);
        assert_eq!(base_cost(50_001), 0.03);
        assert_eq!(base_cost(100_001), 0.05);
    }

    #[test]
    fn test_cost_multiplier() {
        let router = router();
        let claude_acp = catalog().get("claude-acp").unwrap().clone();
        let qwen_cli = catalog().get("qwen-cli").unwrap().clone();
        let local_api = catalog().get("local-api").unwrap().clone();
        assert_eq!(router.cost_multiplier(&claude_acp), 3.0);
        assert_eq!(router.cost_multiplier(&qwen_cli), 0.25);
        assert_eq!(router.cost_multiplier(&local_api), 1.0);
    }

    #[test]
    fn test_tag_match_wins() {
        let decision = router()
            .route(&Task::new("Apply quick fixes to the lint warnings"))
            .unwrap();
        assert_eq!(decision.provider, "qwen-cli");
        assert_eq!(decision.method, CommunicationMethod::Cli);
        assert!(decision.reason.contains("quick fixes"));
    }

    #[test]
    fn test_capability_hint_counts_as_task_text() {
        let task = Task::new("Clean up the module").with_metadata(META_CAPABILITY, "refactoring");
        let decision = router().route(&task).unwrap();
        assert_eq!(decision.provider, "claude-acp");
    }

    #[test]
    fn test_ties_keep_catalog_order() {
        let decision = router().route(&Task::new("Write a haiku")).unwrap();
        assert_eq!(decision.provider, "claude-acp");
    }

    #[test]
    fn test_complexity_hints() {
        let low = Task::new("Rename a variable").with_metadata(META_COMPLEXITY, "low");
        assert_eq!(router().route(&low).unwrap().provider, "qwen-cli");

        let high = Task::new("Rename a variable").with_metadata(META_COMPLEXITY, "high");
        assert_eq!(router().route(&high).unwrap().provider, "claude-acp");
    }

    #[test]
    fn test_priority_favours_api() {
        let task = Task::new("Summarise the log").with_metadata(META_PRIORITY, "urgent");
        assert_eq!(router().route(&task).unwrap().provider, "gemini-api");
    }

    #[test]
    fn test_oversized_task_falls_back_to_largest_window() {
        let request = RouteRequest {
            task: "Read the whole monorepo".to_string(),
            context_size: Some(5_000_000),
            ..RouteRequest::default()
        };
        let decision = router().route_request(request).unwrap();
        assert_eq!(decision.provider, "gemini-api");
        assert!(decision.reason.contains("largest context window"));
        assert_eq!(decision.estimated_cost, 0.05);
    }

    #[test]
    fn test_context_limit_excludes_small_windows() {
        let task = Task::new("quick fixes across the codebase")
            .with_metadata(relay_core::task::META_CONTEXT_SIZE, "60000");
        let decision = router().route(&task).unwrap();
        assert_ne!(decision.provider, "qwen-cli");
    }

    #[test]
    fn test_alternatives_exact_ranking() {
        // 100 chars of description and no files: 25 tokens, base 0.01.
        let decision = router().route(&Task::new("x".repeat(100))).unwrap();
        assert_eq!(decision.provider, "claude-acp");
        assert!((decision.estimated_cost - 0.03).abs() < 1e-12);

        assert_eq!(decision.alternatives.len(), MAX_ALTERNATIVES);
        let ids: Vec<&str> = decision.alternatives.iter().map(|a| a.provider.as_str()).collect();
        assert_eq!(ids, vec!["gemini-api", "qwen-cli", "claude-cli"]);
        assert!(decision.alternatives.iter().all(|a| a.provider != decision.provider));

        let gemini = &decision.alternatives[0];
        assert!((gemini.estimated_cost - 0.01).abs() < 1e-12);
        assert_eq!(gemini.reason, "cheaper option");

        let qwen = &decision.alternatives[1];
        assert!((qwen.estimated_cost - 0.0025).abs() < 1e-12);
        assert_eq!(qwen.reason, "cheaper option");
    }

    #[test]
    fn test_alternative_reasons_when_not_cheaper() {
        let catalog = Arc::new(
            ProviderCatalog::new(vec![
                provider("qwen-cli", CommunicationMethod::Cli, "qwen", 32_000),
                provider("claude-acp", CommunicationMethod::Acp, "claude", 200_000),
                provider("other-cli", CommunicationMethod::Cli, "mistral", 16_000),
            ])
            .unwrap(),
        );
        let decision = Router::new(catalog, RouterConfig::default())
            .route(&Task::new("anything"))
            .unwrap();
        assert_eq!(decision.provider, "qwen-cli");
        assert_eq!(decision.alternatives[0].reason, "larger context window");
        assert_eq!(decision.alternatives[1].reason, "alternative provider");
    }

    #[test]
    fn test_custom_family_factor() {
        let mut config = RouterConfig::default();
        config.provider_factors.insert("llama".to_string(), 0.1);
        let router = Router::new(catalog(), config);
        let local = catalog().get("local-api").unwrap().clone();
        assert!((router.cost_multiplier(&local) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_single_provider_has_no_alternatives() {
        let catalog = Arc::new(
            ProviderCatalog::new(vec![provider(
                "only",
                CommunicationMethod::Cli,
                "qwen",
                10_000,
            )])
            .unwrap(),
        );
        let decision = Router::new(catalog, RouterConfig::default())
            .route(&Task::new("do it"))
            .unwrap();
        assert_eq!(decision.provider, "only");
        assert!(decision.alternatives.is_empty());
    }

    #[test]
    fn test_empty_catalog_and_empty_task() {
        let empty = Router::new(Arc::new(ProviderCatalog::default()), RouterConfig::default());
        assert!(matches!(
            empty.route(&Task::new("do it")),
            Err(RouterError::NoProviders)
        ));
        assert!(matches!(
            router().route(&Task::new("  ")),
            Err(RouterError::InvalidTask(_))
        ));
    }
}
