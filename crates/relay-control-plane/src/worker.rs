//! Worker entity: one provider invocation and everything observed about it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use relay_core::{
    CommunicationMethod, OutputBuffer, ProviderDefinition, Task, WorkerEvent, WorkerEventType,
    WorkerHealth, WorkerId, WorkerOutputResponse, WorkerStatus, WorkerStatusReport,
};

use crate::supervisor::SupervisorCommand;

/// Mutable part of a worker. Only held for short, non-async sections.
#[derive(Debug)]
struct WorkerState {
    status: WorkerStatus,
    health: WorkerHealth,
    output: OutputBuffer,
    last_output_at: Option<DateTime<Utc>>,
    retry_count: u32,
    health_check_count: u32,
    finished_at: Option<DateTime<Utc>>,
    events: Vec<WorkerEvent>,
}

/// Handles used to steer the supervising task.
struct Control {
    cancel: CancellationToken,
    commands: mpsc::Sender<SupervisorCommand>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

/// A supervised provider invocation.
pub struct Worker {
    id: WorkerId,
    provider: String,
    model: String,
    method: CommunicationMethod,
    task: Task,
    metadata: HashMap<String, String>,
    started_at: DateTime<Utc>,
    timeout: Duration,
    state: Mutex<WorkerState>,
    control: Control,
}

impl Worker {
    pub(crate) fn new(
        provider: &ProviderDefinition,
        model: String,
        task: Task,
        metadata: HashMap<String, String>,
        timeout: Duration,
        commands: mpsc::Sender<SupervisorCommand>,
    ) -> Self {
        Self {
            id: WorkerId::generate(),
            provider: provider.id.clone(),
            model,
            method: provider.method,
            task,
            metadata,
            started_at: Utc::now(),
            timeout,
            state: Mutex::new(WorkerState {
                status: WorkerStatus::Idle,
                health: WorkerHealth::Healthy,
                output: OutputBuffer::new(),
                last_output_at: None,
                retry_count: 0,
                health_check_count: 0,
                finished_at: None,
                events: Vec::new(),
            }),
            control: Control {
                cancel: CancellationToken::new(),
                commands,
                supervisor: Mutex::new(None),
            },
        }
    }

    fn state(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn method(&self) -> CommunicationMethod {
        self.method
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Lifetime budget, measured from `started_at`.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn status(&self) -> WorkerStatus {
        self.state().status
    }

    pub fn health(&self) -> WorkerHealth {
        self.state().health
    }

    pub fn is_active(&self) -> bool {
        self.status().is_active()
    }

    pub fn retry_count(&self) -> u32 {
        self.state().retry_count
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.state().finished_at
    }

    /// Full output text.
    pub fn output(&self) -> String {
        self.state().output.as_str().to_string()
    }

    /// Lifecycle events recorded so far.
    pub fn events(&self) -> Vec<WorkerEvent> {
        self.state().events.clone()
    }

    /// Most recent provider output, or the start time when there was none.
    /// Diagnostic lines written by the supervisor do not count.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.state().last_output_at.unwrap_or(self.started_at)
    }

    /// Consistent snapshot for status queries.
    pub fn report(&self) -> WorkerStatusReport {
        let state = self.state();
        WorkerStatusReport {
            id: self.id.clone(),
            status: state.status,
            health: state.health,
            provider: self.provider.clone(),
            model: self.model.clone(),
            method: self.method,
            task: self.task.description.clone(),
            started_at: self.started_at,
            last_output_at: state.last_output_at,
            health_check_count: state.health_check_count,
            retry_count: state.retry_count,
            metadata: self.metadata.clone(),
        }
    }

    /// Run an output query under the worker lock.
    pub fn query_output(
        &self,
        since: Option<DateTime<Utc>>,
        filter: Option<&Regex>,
        limit: Option<usize>,
    ) -> WorkerOutputResponse {
        let state = self.state();
        let view = state.output.query(since, filter, limit);
        WorkerOutputResponse {
            worker_id: self.id.clone(),
            output: view.text,
            line_count: view.line_count,
            last_updated: state.output.last_write().unwrap_or(self.started_at),
            truncated: view.truncated,
        }
    }

    pub(crate) fn mark_running(&self) {
        let mut state = self.state();
        if state.status.can_transition_to(WorkerStatus::Running) {
            state.status = WorkerStatus::Running;
            state
                .events
                .push(WorkerEvent::new(self.id.clone(), WorkerEventType::Started, HashMap::new()));
        }
    }

    /// Append provider output. Ignored once the worker is terminal, so a
    /// closing note stays the last line.
    pub(crate) fn append_output(&self, chunk: &str) {
        let now = Utc::now();
        let mut state = self.state();
        if state.status.is_terminal() {
            return;
        }
        state.output.append(chunk, now);
        state.last_output_at = Some(now);
    }

    pub(crate) fn record_event(&self, event_type: WorkerEventType, key: &str, value: impl Into<String>) {
        let event = WorkerEvent::with_detail(self.id.clone(), event_type, key, value);
        self.state().events.push(event);
    }

    /// Record a probe result. Returns the previous health when it changed.
    pub(crate) fn record_probe(&self, health: WorkerHealth) -> Option<WorkerHealth> {
        let mut state = self.state();
        state.health_check_count += 1;
        if state.health == health {
            return None;
        }
        let previous = std::mem::replace(&mut state.health, health);
        state.events.push(WorkerEvent::with_detail(
            self.id.clone(),
            WorkerEventType::HealthChanged,
            "health",
            health.to_string(),
        ));
        Some(previous)
    }

    /// Count a transient failure and note it in the output. Returns the new count.
    pub(crate) fn record_retry(&self, detail: &str) -> u32 {
        let mut state = self.state();
        if state.status.is_terminal() {
            return state.retry_count;
        }
        state.retry_count += 1;
        let count = state.retry_count;
        state.output.append(&format!("[retry {}] {}", count, detail), Utc::now());
        state.events.push(WorkerEvent::with_detail(
            self.id.clone(),
            WorkerEventType::RetryRecorded,
            "detail",
            detail,
        ));
        count
    }

    /// Move to a terminal status unless one was already reached.
    ///
    /// Cancellation, timeout, exhaustion and normal exit all end here; only
    /// the first caller wins. The note, if any, becomes the last output line.
    pub(crate) fn finish(
        &self,
        status: WorkerStatus,
        event_type: WorkerEventType,
        note: Option<&str>,
    ) -> bool {
        let mut state = self.state();
        if !state.status.can_transition_to(status) || !status.is_terminal() {
            return false;
        }
        let now = Utc::now();
        state.status = status;
        state.finished_at = Some(now);
        if let Some(note) = note {
            state.output.append(note, now);
        }
        state.events.push(WorkerEvent::with_detail(
            self.id.clone(),
            event_type,
            "status",
            status.as_str(),
        ));
        true
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.control.cancel.clone()
    }

    pub(crate) fn commands(&self) -> &mpsc::Sender<SupervisorCommand> {
        &self.control.commands
    }

    pub(crate) fn attach_supervisor(&self, handle: JoinHandle<()>) {
        *self.control.supervisor.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    pub(crate) fn take_supervisor(&self) -> Option<JoinHandle<()>> {
        self.control
            .supervisor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("method", &self.method)
            .field("status", &self.status())
            .finish()
    }
}
