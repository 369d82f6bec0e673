//! Status enums for Workers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a Worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Worker created, session not started yet.
    #[default]
    Idle,
    /// Session/process is live.
    Running,
    /// Provider finished successfully.
    Completed,
    /// Provider failed or the retry budget ran out.
    Failed,
    /// Stopped by a caller or by the timeout.
    Cancelled,
}

impl WorkerStatus {
    /// Returns true if the worker is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the worker is still active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether `self -> next` is a legal lifecycle step.
    pub fn can_transition_to(&self, next: WorkerStatus) -> bool {
        match self {
            Self::Idle => next != Self::Idle,
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness of a Worker as seen by the periodic probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerHealth {
    /// Output or liveness observed recently.
    #[default]
    Healthy,
    /// Quiet for longer than the degraded threshold.
    Degraded,
    /// Quiet for longer than the unresponsive threshold, or the transport died.
    Unresponsive,
}

impl fmt::Display for WorkerHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unresponsive => "unresponsive",
        };
        f.write_str(s)
    }
}

/// Outcome of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelStatus {
    Cancelled,
    AlreadyStopped,
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            WorkerStatus::Completed,
            WorkerStatus::Failed,
            WorkerStatus::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            for next in [
                WorkerStatus::Idle,
                WorkerStatus::Running,
                WorkerStatus::Completed,
                WorkerStatus::Failed,
                WorkerStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_running_only_moves_to_terminal() {
        assert!(!WorkerStatus::Running.can_transition_to(WorkerStatus::Idle));
        assert!(!WorkerStatus::Running.can_transition_to(WorkerStatus::Running));
        assert!(WorkerStatus::Running.can_transition_to(WorkerStatus::Cancelled));
        assert!(WorkerStatus::Idle.can_transition_to(WorkerStatus::Running));
    }

    #[test]
    fn test_cancel_status_serialization() {
        let json = serde_json::to_string(&CancelStatus::AlreadyStopped).unwrap();
        assert_eq!(json, "\"already_stopped\"");
    }
}
