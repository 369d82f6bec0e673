//! Per-worker supervising task.
//!
//! Owns the transport for its whole life and is the only place output is
//! written from. Each loop turn handles one of: cancellation, the lifetime
//! deadline, a transport event, a follow-up prompt, or a health probe.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_core::{
    CommunicationMethod, PromptId, PromptRequest, WorkerEventType, WorkerHealth, WorkerStatus,
};
use relay_transport::{Transport, TransportError, TransportEvent};

use crate::config::ManagerConfig;
use crate::worker::Worker;

/// Requests the manager forwards to a supervisor.
#[derive(Debug)]
pub(crate) enum SupervisorCommand {
    Prompt {
        prompt_id: PromptId,
        request: PromptRequest,
        ack: oneshot::Sender<Result<(), TransportError>>,
    },
}

/// Probe thresholds and the retry budget.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HealthPolicy {
    pub interval: Duration,
    pub degraded_after: Duration,
    pub unresponsive_after: Duration,
    pub max_retries: u32,
}

impl From<&ManagerConfig> for HealthPolicy {
    fn from(config: &ManagerConfig) -> Self {
        Self {
            interval: config.health_check_interval(),
            degraded_after: config.degraded_after(),
            unresponsive_after: config.unresponsive_after(),
            max_retries: config.max_retries,
        }
    }
}

impl HealthPolicy {
    /// Classify a worker from transport liveness and output silence.
    ///
    /// A live session waiting for its next prompt is at worst degraded, and an
    /// API request in flight is healthy regardless of silence.
    pub(crate) fn classify(
        &self,
        method: CommunicationMethod,
        alive: bool,
        quiet: Duration,
    ) -> WorkerHealth {
        if !alive {
            return WorkerHealth::Unresponsive;
        }
        match method {
            CommunicationMethod::Api => WorkerHealth::Healthy,
            _ if quiet >= self.unresponsive_after && method == CommunicationMethod::Cli => {
                WorkerHealth::Unresponsive
            }
            _ if quiet >= self.degraded_after => WorkerHealth::Degraded,
            _ => WorkerHealth::Healthy,
        }
    }
}

enum Step {
    Cancelled,
    TimedOut,
    Event(Option<TransportEvent>),
    Command(SupervisorCommand),
    Probe,
}

pub(crate) struct Supervisor {
    worker: Arc<Worker>,
    transport: Transport,
    events: mpsc::Receiver<TransportEvent>,
    commands: mpsc::Receiver<SupervisorCommand>,
    cancel: CancellationToken,
    policy: HealthPolicy,
}

impl Supervisor {
    pub(crate) fn new(
        worker: Arc<Worker>,
        transport: Transport,
        events: mpsc::Receiver<TransportEvent>,
        commands: mpsc::Receiver<SupervisorCommand>,
        policy: HealthPolicy,
    ) -> Self {
        let cancel = worker.cancel_token();
        Self {
            worker,
            transport,
            events,
            commands,
            cancel,
            policy,
        }
    }

    pub(crate) async fn run(mut self) {
        let elapsed = (Utc::now() - self.worker.started_at())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let deadline = tokio::time::sleep_until(
            Instant::now() + self.worker.timeout().saturating_sub(elapsed),
        );
        tokio::pin!(deadline);

        let mut probe =
            tokio::time::interval_at(Instant::now() + self.policy.interval, self.policy.interval);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(worker_id = %self.worker.id(), "Supervisor started");

        loop {
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Step::Cancelled,
                _ = &mut deadline => Step::TimedOut,
                event = self.events.recv() => Step::Event(event),
                Some(command) = self.commands.recv() => Step::Command(command),
                _ = probe.tick() => Step::Probe,
            };

            match step {
                Step::Cancelled => {
                    // The manager already recorded the cancelled status.
                    self.transport.stop().await;
                    info!(worker_id = %self.worker.id(), "Worker session stopped");
                    break;
                }
                Step::TimedOut => {
                    let timeout = self.worker.timeout();
                    warn!(worker_id = %self.worker.id(), ?timeout, "Worker timed out");
                    let note = format!("[timeout] worker exceeded its {:?} lifetime", timeout);
                    self.worker
                        .finish(WorkerStatus::Cancelled, WorkerEventType::TimedOut, Some(&note));
                    self.transport.stop().await;
                    break;
                }
                Step::Event(Some(event)) => self.handle_event(event),
                Step::Event(None) => {
                    self.on_closed().await;
                    break;
                }
                Step::Command(command) => self.handle_command(command).await,
                Step::Probe => {
                    if self.probe() {
                        self.transport.stop().await;
                        break;
                    }
                }
            }

            if !self.worker.is_active() {
                // A transient-failure budget ran out while handling an event.
                self.transport.stop().await;
                break;
            }
        }

        debug!(worker_id = %self.worker.id(), status = %self.worker.status(), "Supervisor exited");
    }

    fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Stdout(line) => self.worker.append_output(&line),
            TransportEvent::Stderr(line) => self.worker.append_output(&format!("[stderr] {}", line)),
            TransportEvent::Transient(detail) => self.record_transient(&detail),
        }
    }

    async fn on_closed(&mut self) {
        let outcome = self.transport.finish().await;
        let worker_id = self.worker.id();
        if outcome.success {
            if self
                .worker
                .finish(WorkerStatus::Completed, WorkerEventType::Completed, None)
            {
                info!(worker_id = %worker_id, "Worker completed");
            }
            return;
        }

        let detail = outcome
            .detail
            .unwrap_or_else(|| "provider exited unsuccessfully".to_string());
        let note = format!("[exit] {}", detail);
        if self
            .worker
            .finish(WorkerStatus::Failed, WorkerEventType::Failed, Some(&note))
        {
            warn!(worker_id = %worker_id, exit_code = ?outcome.exit_code, detail = %detail, "Worker failed");
        }
    }

    async fn handle_command(&mut self, command: SupervisorCommand) {
        match command {
            SupervisorCommand::Prompt {
                prompt_id,
                request,
                ack,
            } => {
                let result = self
                    .transport
                    .send(&request.prompt, &request.context_files, &request.tools)
                    .await;
                match &result {
                    Ok(()) => {
                        info!(worker_id = %self.worker.id(), prompt_id = %prompt_id, "Prompt sent");
                        self.worker.record_event(
                            WorkerEventType::PromptSent,
                            "prompt_id",
                            prompt_id.as_str(),
                        );
                    }
                    Err(e) => {
                        warn!(worker_id = %self.worker.id(), prompt_id = %prompt_id, error = %e, "Prompt failed");
                    }
                }
                if ack.send(result).is_err() {
                    debug!(prompt_id = %prompt_id, "Prompt caller went away before the ack");
                }
            }
        }
    }

    /// Count a transient failure; fail the worker once the budget is spent.
    fn record_transient(&self, detail: &str) {
        let count = self.worker.record_retry(detail);
        warn!(
            worker_id = %self.worker.id(),
            retry_count = count,
            max_retries = self.policy.max_retries,
            detail = %detail,
            "Transient failure"
        );
        if count > self.policy.max_retries {
            let note = format!("[error] gave up after {} transient failures", count);
            self.worker
                .finish(WorkerStatus::Failed, WorkerEventType::Failed, Some(&note));
        }
    }

    /// Run one health probe. Returns true when the worker was failed.
    fn probe(&mut self) -> bool {
        let alive = self.transport.is_alive();
        let quiet = (Utc::now() - self.worker.last_activity())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let health = self.policy.classify(self.worker.method(), alive, quiet);

        if let Some(previous) = self.worker.record_probe(health) {
            info!(
                worker_id = %self.worker.id(),
                from = %previous,
                to = %health,
                quiet_ms = quiet.as_millis() as u64,
                "Worker health changed"
            );
        }

        if health == WorkerHealth::Unresponsive {
            let detail = if alive {
                format!("no output for {:?}", quiet)
            } else {
                "provider process is not running".to_string()
            };
            self.record_transient(&detail);
        }
        !self.worker.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> HealthPolicy {
        HealthPolicy {
            interval: Duration::from_secs(1),
            degraded_after: Duration::from_secs(10),
            unresponsive_after: Duration::from_secs(30),
            max_retries: 3,
        }
    }

    #[test]
    fn test_dead_transport_is_unresponsive() {
        for method in [
            CommunicationMethod::Acp,
            CommunicationMethod::Cli,
            CommunicationMethod::Api,
        ] {
            assert_eq!(
                policy().classify(method, false, Duration::ZERO),
                WorkerHealth::Unresponsive
            );
        }
    }

    #[test]
    fn test_silence_thresholds() {
        let p = policy();
        let cli = CommunicationMethod::Cli;
        assert_eq!(p.classify(cli, true, Duration::from_secs(5)), WorkerHealth::Healthy);
        assert_eq!(p.classify(cli, true, Duration::from_secs(10)), WorkerHealth::Degraded);
        assert_eq!(p.classify(cli, true, Duration::from_secs(31)), WorkerHealth::Unresponsive);
    }

    #[test]
    fn test_idle_session_is_at_worst_degraded() {
        let p = policy();
        assert_eq!(
            p.classify(CommunicationMethod::Acp, true, Duration::from_secs(600)),
            WorkerHealth::Degraded
        );
        assert_eq!(
            p.classify(CommunicationMethod::Api, true, Duration::from_secs(600)),
            WorkerHealth::Healthy
        );
    }

    #[test]
    fn test_policy_from_config() {
        let config = ManagerConfig {
            health_check_interval_ms: 250,
            max_retries: 7,
            ..ManagerConfig::default()
        };
        let p = HealthPolicy::from(&config);
        assert_eq!(p.interval, Duration::from_millis(250));
        assert_eq!(p.max_retries, 7);
    }
}
