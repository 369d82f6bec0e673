//! Worker manager - spawns, tracks and stops provider workers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{info, warn};

use relay_core::output::{compile_filter, parse_timestamp};
use relay_core::{
    CancelRequest, CancelResponse, CancelStatus, CommunicationMethod, CoreError, PromptId,
    PromptRequest, PromptResponse, SpawnRequest, WorkerEvent, WorkerEventType, WorkerId,
    WorkerOutputRequest, WorkerOutputResponse, WorkerStatus, WorkerStatusReport,
};
use relay_transport::{StartOptions, Transport, TransportError};

use crate::catalog::ProviderCatalog;
use crate::config::ManagerConfig;
use crate::supervisor::{HealthPolicy, Supervisor, SupervisorCommand};
use crate::worker::Worker;

/// Upper bound on a worker lifetime.
const MAX_WORKER_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const COMMAND_BUFFER: usize = 8;

/// Manager errors.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Provider '{provider}' uses {expected}, not {requested}")]
    MethodMismatch {
        provider: String,
        expected: CommunicationMethod,
        requested: CommunicationMethod,
    },

    #[error("Failed to start provider: {0}")]
    Transport(#[from] TransportError),

    #[error("Provider '{provider}' did not start within {timeout:?}")]
    ConnectTimeout { provider: String, timeout: Duration },

    #[error("Worker {worker_id} is not accepting prompts: {reason}")]
    NotAcceptingPrompts { worker_id: WorkerId, reason: String },

    #[error("Prompt to worker {0} was not acknowledged in time")]
    PromptTimeout(WorkerId),

    #[error("Worker {0} is still active")]
    WorkerActive(WorkerId),
}

/// Owns every worker and the catalog they are started from.
pub struct WorkerManager {
    catalog: Arc<ProviderCatalog>,
    config: ManagerConfig,
    workers: RwLock<HashMap<WorkerId, Arc<Worker>>>,
}

impl WorkerManager {
    /// Create a new WorkerManager wrapped in Arc.
    pub fn new(catalog: Arc<ProviderCatalog>, config: ManagerConfig) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            config,
            workers: RwLock::new(HashMap::new()),
        })
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    /// Validate the request, start the provider and register a running worker.
    pub async fn spawn(&self, request: SpawnRequest) -> Result<WorkerId, ManagerError> {
        let provider = self
            .catalog
            .get(&request.provider)
            .ok_or_else(|| CoreError::UnknownProvider(request.provider.clone()))?;

        if let Some(method) = request.method.as_deref().filter(|m| !m.trim().is_empty()) {
            let requested: CommunicationMethod = method.parse()?;
            if requested != provider.method {
                return Err(ManagerError::MethodMismatch {
                    provider: provider.id.clone(),
                    expected: provider.method,
                    requested,
                });
            }
        }

        if request.task.description.trim().is_empty() {
            return Err(CoreError::InvalidInput("task description must not be empty".to_string()).into());
        }

        let model = request
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| provider.model.clone());
        let timeout = request
            .timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.config.default_timeout())
            .min(MAX_WORKER_TIMEOUT);

        let mut options = StartOptions::new(model.clone(), request.task.to_prompt())
            .with_max_retries(self.config.max_retries)
            .with_retry_backoff(self.config.retry_backoff())
            .with_request_timeout(self.config.request_timeout())
            .with_stop_grace(self.config.stop_grace());
        if let Some(path) = request.config_path.as_deref().filter(|p| !p.is_empty()) {
            options = options.with_config_path(path);
        }

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let worker = Arc::new(Worker::new(
            provider,
            model,
            request.task,
            request.metadata,
            timeout,
            command_tx,
        ));
        let worker_id = worker.id().clone();

        let connect_timeout = self.config.connect_timeout();
        let (transport, events) =
            match tokio::time::timeout(connect_timeout, Transport::start(provider, options)).await {
                Ok(Ok(started)) => started,
                Ok(Err(e)) => {
                    warn!(provider = %provider.id, error = %e, "Failed to start worker");
                    return Err(e.into());
                }
                Err(_) => {
                    warn!(provider = %provider.id, ?connect_timeout, "Provider start timed out");
                    return Err(ManagerError::ConnectTimeout {
                        provider: provider.id.clone(),
                        timeout: connect_timeout,
                    });
                }
            };

        worker.mark_running();

        let supervisor = Supervisor::new(
            worker.clone(),
            transport,
            events,
            command_rx,
            HealthPolicy::from(&self.config),
        );
        worker.attach_supervisor(tokio::spawn(supervisor.run()));

        self.workers
            .write()
            .await
            .insert(worker_id.clone(), worker.clone());

        info!(
            worker_id = %worker_id,
            provider = %provider.id,
            method = %provider.method,
            model = %worker.model(),
            ?timeout,
            "Worker spawned"
        );

        Ok(worker_id)
    }

    pub async fn get(&self, worker_id: &WorkerId) -> Option<Arc<Worker>> {
        self.workers.read().await.get(worker_id).cloned()
    }

    /// All workers, oldest first.
    pub async fn list(&self) -> Vec<Arc<Worker>> {
        let mut workers: Vec<_> = self.workers.read().await.values().cloned().collect();
        workers.sort_by_key(|w| w.started_at());
        workers
    }

    /// Get the number of tracked workers.
    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn status(&self, worker_id: &WorkerId) -> Result<WorkerStatusReport, ManagerError> {
        Ok(self.lookup(worker_id).await?.report())
    }

    pub async fn events(&self, worker_id: &WorkerId) -> Result<Vec<WorkerEvent>, ManagerError> {
        Ok(self.lookup(worker_id).await?.events())
    }

    /// Hand a follow-up prompt to a running session and wait until it is written.
    pub async fn send_prompt(&self, request: PromptRequest) -> Result<PromptResponse, ManagerError> {
        let worker = self.lookup(&request.worker_id).await?;
        let worker_id = worker.id().clone();

        if !worker.method().is_session() {
            return Err(ManagerError::NotAcceptingPrompts {
                worker_id,
                reason: format!("{} workers take a single prompt", worker.method()),
            });
        }
        let status = worker.status();
        if status != WorkerStatus::Running {
            return Err(ManagerError::NotAcceptingPrompts {
                worker_id,
                reason: format!("worker is {}", status),
            });
        }

        let prompt_id = PromptId::generate();
        let (ack_tx, ack_rx) = oneshot::channel();
        let command = SupervisorCommand::Prompt {
            prompt_id: prompt_id.clone(),
            request,
            ack: ack_tx,
        };
        if worker.commands().send(command).await.is_err() {
            return Err(ManagerError::NotAcceptingPrompts {
                worker_id,
                reason: "session has ended".to_string(),
            });
        }

        match tokio::time::timeout(self.config.prompt_ack_timeout(), ack_rx).await {
            Ok(Ok(Ok(()))) => Ok(PromptResponse {
                prompt_id,
                status: "sent".to_string(),
            }),
            Ok(Ok(Err(e))) => Err(e.into()),
            Ok(Err(_)) => Err(ManagerError::NotAcceptingPrompts {
                worker_id,
                reason: "session ended before the prompt was written".to_string(),
            }),
            Err(_) => Err(ManagerError::PromptTimeout(worker_id)),
        }
    }

    /// Stop a worker. Repeated calls are harmless.
    pub async fn cancel(&self, request: CancelRequest) -> CancelResponse {
        let worker_id = request.worker_id;
        let respond = |status| CancelResponse {
            worker_id: worker_id.clone(),
            status,
            cancelled_at: Utc::now(),
        };

        let Some(worker) = self.get(&worker_id).await else {
            return respond(CancelStatus::NotFound);
        };

        let reason = request
            .reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "cancelled by request".to_string());
        let note = format!("[cancelled] {}", reason);
        if !worker.finish(WorkerStatus::Cancelled, WorkerEventType::Cancelled, Some(&note)) {
            return respond(CancelStatus::AlreadyStopped);
        }

        worker.cancel_token().cancel();
        if let Some(mut handle) = worker.take_supervisor() {
            // Stopping may take up to the grace period, then the kill.
            let wait = self.config.stop_grace() * 2 + Duration::from_secs(1);
            if tokio::time::timeout(wait, &mut handle).await.is_err() {
                warn!(worker_id = %worker_id, "Supervisor did not stop in time, aborting");
                handle.abort();
            }
        }

        info!(worker_id = %worker_id, reason = %reason, "Worker cancelled");
        respond(CancelStatus::Cancelled)
    }

    /// Query a worker's output.
    pub async fn get_output(
        &self,
        request: WorkerOutputRequest,
    ) -> Result<WorkerOutputResponse, ManagerError> {
        let worker = self.lookup(&request.worker_id).await?;
        let since = request
            .since
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(parse_timestamp)
            .transpose()?;
        let filter = request.filter.as_deref().map(compile_filter).transpose()?;
        Ok(worker.query_output(since, filter.as_ref(), request.limit))
    }

    /// Forget a finished worker.
    pub async fn evict(&self, worker_id: &WorkerId) -> Result<Arc<Worker>, ManagerError> {
        let mut workers = self.workers.write().await;
        let worker = workers
            .get(worker_id)
            .ok_or_else(|| CoreError::WorkerNotFound(worker_id.to_string()))?;
        if worker.is_active() {
            return Err(ManagerError::WorkerActive(worker_id.clone()));
        }
        let worker = workers
            .remove(worker_id)
            .ok_or_else(|| CoreError::WorkerNotFound(worker_id.to_string()))?;
        info!(worker_id = %worker_id, status = %worker.status(), "Worker evicted");
        Ok(worker)
    }

    /// Forget every worker that finished at least `max_age` ago.
    pub async fn prune_finished(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::zero());
        let mut workers = self.workers.write().await;
        let before = workers.len();
        workers.retain(|_, w| match w.finished_at() {
            Some(at) => at > cutoff,
            None => true,
        });
        let pruned = before - workers.len();
        if pruned > 0 {
            info!(pruned, remaining = workers.len(), "Pruned finished workers");
        }
        pruned
    }

    /// Cancel every active worker.
    pub async fn shutdown(&self) {
        let active: Vec<WorkerId> = self
            .list()
            .await
            .into_iter()
            .filter(|w| w.is_active())
            .map(|w| w.id().clone())
            .collect();
        info!(count = active.len(), "Shutting down workers");
        for worker_id in active {
            let request = CancelRequest {
                worker_id,
                reason: Some("manager shutdown".to_string()),
            };
            self.cancel(request).await;
        }
    }

    async fn lookup(&self, worker_id: &WorkerId) -> Result<Arc<Worker>, ManagerError> {
        self.get(worker_id)
            .await
            .ok_or_else(|| CoreError::WorkerNotFound(worker_id.to_string()).into())
    }
}
