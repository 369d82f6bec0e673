//! Worker lifecycle events.

use crate::ids::{EventId, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A lifecycle event recorded by a worker's supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerEvent {
    /// Unique event identifier.
    pub id: EventId,
    /// Worker this event belongs to.
    pub worker_id: WorkerId,
    /// Type of event.
    pub event_type: WorkerEventType,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Event-specific metadata (exit code, error, health, etc.).
    pub metadata: HashMap<String, String>,
}

impl WorkerEvent {
    /// Create a new worker event.
    pub fn new(
        worker_id: WorkerId,
        event_type: WorkerEventType,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: EventId::generate(),
            worker_id,
            event_type,
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// Create an event carrying a single metadata entry.
    pub fn with_detail(
        worker_id: WorkerId,
        event_type: WorkerEventType,
        key: &str,
        value: impl Into<String>,
    ) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(key.to_string(), value.into());
        Self::new(worker_id, event_type, metadata)
    }
}

/// Type of worker event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerEventType {
    /// Transport started, worker is running.
    Started,
    /// Follow-up prompt written to the session.
    PromptSent,
    /// Health changed after a probe.
    HealthChanged,
    /// Transient failure counted against the retry budget.
    RetryRecorded,
    /// Provider finished successfully.
    Completed,
    /// Provider failed.
    Failed,
    /// Cancelled by a caller.
    Cancelled,
    /// Lifetime budget exceeded.
    TimedOut,
}
