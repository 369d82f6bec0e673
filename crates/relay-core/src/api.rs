//! Request and response payloads exchanged with the tool-invocation layer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{META_COMPLEXITY, META_CONTEXT_SIZE, META_PRIORITY};
use crate::{CancelStatus, CommunicationMethod, PromptId, Task, WorkerHealth, WorkerId, WorkerStatus};

/// Request to start a worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// Provider id from the catalog.
    pub provider: String,

    /// Model override; defaults to the provider's model.
    #[serde(default)]
    pub model: Option<String>,

    /// Communication method; must match the provider when given.
    #[serde(default)]
    pub method: Option<String>,

    /// Work to perform.
    pub task: Task,

    /// Lifetime budget in seconds; defaults to the manager's configured value.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Per-worker config file handed to the provider process.
    #[serde(default)]
    pub config_path: Option<String>,

    /// Caller metadata, reported back in status queries.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SpawnRequest {
    pub fn new(provider: impl Into<String>, task: Task) -> Self {
        Self {
            provider: provider.into(),
            task,
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// Follow-up instruction for a live session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    pub worker_id: WorkerId,
    pub prompt: String,
    #[serde(default)]
    pub context_files: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
}

impl PromptRequest {
    pub fn new(worker_id: WorkerId, prompt: impl Into<String>) -> Self {
        Self {
            worker_id,
            prompt: prompt.into(),
            context_files: Vec::new(),
            tools: Vec::new(),
        }
    }
}

/// Acknowledgement of a follow-up prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResponse {
    pub prompt_id: PromptId,
    pub status: String,
}

/// Snapshot answering a `WorkerStatusQuery`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatusReport {
    pub id: WorkerId,
    pub status: WorkerStatus,
    pub health: WorkerHealth,
    pub provider: String,
    pub model: String,
    pub method: CommunicationMethod,
    pub task: String,
    pub started_at: DateTime<Utc>,
    pub last_output_at: Option<DateTime<Utc>>,
    pub health_check_count: u32,
    pub retry_count: u32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Output poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOutputRequest {
    pub worker_id: WorkerId,
    /// RFC 3339 watermark; only output appended after it is returned.
    #[serde(default)]
    pub since: Option<String>,
    /// Regex applied per line.
    #[serde(default)]
    pub filter: Option<String>,
    /// Maximum number of lines; 0 means unlimited.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl WorkerOutputRequest {
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            since: None,
            filter: None,
            limit: None,
        }
    }

    pub fn with_filter(mut self, pattern: impl Into<String>) -> Self {
        self.filter = Some(pattern.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_since(mut self, since: impl Into<String>) -> Self {
        self.since = Some(since.into());
        self
    }
}

/// Output poll result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOutputResponse {
    pub worker_id: WorkerId,
    pub output: String,
    /// Lines in the full output, independent of filter and limit.
    pub line_count: usize,
    pub last_updated: DateTime<Utc>,
    pub truncated: bool,
}

/// Request to stop a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub worker_id: WorkerId,
    #[serde(default)]
    pub reason: Option<String>,
}

impl CancelRequest {
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            reason: None,
        }
    }
}

/// Result of a cancel request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub worker_id: WorkerId,
    pub status: CancelStatus,
    pub cancelled_at: DateTime<Utc>,
}

/// Routing request as sent by the tool layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteRequest {
    pub task: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub context_size: Option<u64>,
    #[serde(default)]
    pub complexity: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

impl RouteRequest {
    /// Fold the flat request into a Task with metadata hints.
    pub fn into_task(self) -> Task {
        let mut task = Task::new(self.task);
        task.files = self.files;
        if let Some(size) = self.context_size {
            task.metadata.insert(META_CONTEXT_SIZE.to_string(), size.to_string());
        }
        if let Some(complexity) = self.complexity {
            task.metadata.insert(META_COMPLEXITY.to_string(), complexity);
        }
        if let Some(priority) = self.priority {
            task.metadata.insert(META_PRIORITY.to_string(), priority);
        }
        task
    }
}

/// A ranked alternative to the chosen provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub provider: String,
    pub model: String,
    pub method: CommunicationMethod,
    pub estimated_cost: f64,
    pub reason: String,
}

/// The router's recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub provider: String,
    pub model: String,
    pub method: CommunicationMethod,
    pub reason: String,
    pub estimated_cost: f64,
    pub alternatives: Vec<Alternative>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Complexity;

    #[test]
    fn test_route_request_into_task() {
        let request = RouteRequest {
            task: "Port the parser".to_string(),
            files: vec!["parser.rs".to_string()],
            context_size: Some(60_000),
            complexity: Some("high".to_string()),
            priority: None,
        };
        let task = request.into_task();
        assert_eq!(task.files, vec!["parser.rs".to_string()]);
        assert_eq!(task.estimated_tokens(), 60_000);
        assert_eq!(task.complexity(), Some(Complexity::High));
        assert!(task.priority().is_none());
    }

    #[test]
    fn test_output_request_defaults() {
        let json = r#"{"worker_id": "w-1"}"#;
        let request: WorkerOutputRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.worker_id.as_str(), "w-1");
        assert!(request.filter.is_none());
        assert!(request.limit.is_none());
    }
}
