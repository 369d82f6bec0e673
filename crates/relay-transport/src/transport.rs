//! Uniform surface over the three communication methods.

use std::time::Duration;

use relay_core::{CommunicationMethod, ProviderDefinition};
use tokio::sync::mpsc;
use tracing::info;

use crate::acp::AcpSession;
use crate::api::ApiCall;
use crate::cli::CliProcess;
use crate::error::TransportError;

const EVENT_BUFFER: usize = 256;

/// Something a provider produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Regular output.
    Stdout(String),
    /// Diagnostic output.
    Stderr(String),
    /// A retryable failure; the transport is retrying.
    Transient(String),
}

/// How a transport ended once its output closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub detail: Option<String>,
}

impl ExitOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            detail: None,
        }
    }

    pub fn failure(exit_code: Option<i32>, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code,
            detail: Some(detail.into()),
        }
    }
}

/// Per-start settings.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Model to request.
    pub model: String,
    /// Initial prompt.
    pub prompt: String,
    /// Per-worker config file.
    pub config_path: Option<String>,
    /// Retries for transient API failures.
    pub max_retries: u32,
    /// Base delay between API retries (multiplied by the attempt number).
    pub retry_backoff: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// How long a stopped process gets to exit before it is reaped forcibly.
    pub stop_grace: Duration,
}

impl StartOptions {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            config_path: None,
            max_retries: 3,
            retry_backoff: Duration::from_secs(2),
            request_timeout: Duration::from_secs(300),
            stop_grace: Duration::from_secs(5),
        }
    }

    pub fn with_config_path(mut self, path: impl Into<String>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

/// A started provider connection.
pub enum Transport {
    Acp(AcpSession),
    Cli(CliProcess),
    Api(ApiCall),
}

impl Transport {
    /// Start the provider and hand back the output receiver. The receiver
    /// yields `None` once the provider has closed all of its output.
    pub async fn start(
        provider: &ProviderDefinition,
        options: StartOptions,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>), TransportError> {
        info!(
            provider = %provider.id,
            method = %provider.method,
            model = %options.model,
            prompt_len = options.prompt.len(),
            "Starting provider transport"
        );

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let transport = match provider.method {
            CommunicationMethod::Acp => Self::Acp(AcpSession::start(provider, &options, tx).await?),
            CommunicationMethod::Cli => Self::Cli(CliProcess::start(provider, &options, tx)?),
            CommunicationMethod::Api => Self::Api(ApiCall::start(provider, &options, tx)?),
        };
        Ok((transport, rx))
    }

    pub fn method(&self) -> CommunicationMethod {
        match self {
            Self::Acp(_) => CommunicationMethod::Acp,
            Self::Cli(_) => CommunicationMethod::Cli,
            Self::Api(_) => CommunicationMethod::Api,
        }
    }

    /// Send a follow-up prompt. Only sessions accept prompts.
    pub async fn send(
        &mut self,
        prompt: &str,
        context_files: &[String],
        tools: &[String],
    ) -> Result<(), TransportError> {
        match self {
            Self::Acp(session) => session.prompt(prompt, context_files, tools).await,
            Self::Cli(_) => Err(TransportError::NotSupported {
                method: "cli",
                operation: "follow-up prompts",
            }),
            Self::Api(_) => Err(TransportError::NotSupported {
                method: "api",
                operation: "follow-up prompts",
            }),
        }
    }

    /// Liveness probe.
    pub fn is_alive(&mut self) -> bool {
        match self {
            Self::Acp(session) => session.is_alive(),
            Self::Cli(process) => process.is_alive(),
            Self::Api(call) => call.is_alive(),
        }
    }

    /// Collect the exit outcome after the output receiver has closed.
    pub async fn finish(&mut self) -> ExitOutcome {
        match self {
            Self::Acp(session) => session.finish().await,
            Self::Cli(process) => process.finish().await,
            Self::Api(call) => call.finish().await,
        }
    }

    /// Stop the provider and release its process or request.
    pub async fn stop(&mut self) {
        match self {
            Self::Acp(session) => session.stop().await,
            Self::Cli(process) => process.stop().await,
            Self::Api(call) => call.stop(),
        }
    }
}
