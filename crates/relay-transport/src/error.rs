//! Error types for the transports.

use thiserror::Error;

/// Errors that can occur while starting or talking to a provider.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Provider has no command configured.
    #[error("Provider '{0}' has no launch command configured")]
    MissingCommand(String),

    /// Provider has no endpoint configured.
    #[error("Provider '{0}' has no API endpoint configured")]
    MissingEndpoint(String),

    /// Failed to spawn the provider process.
    #[error("Failed to spawn provider process: {0}")]
    SpawnError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// HTTP request failed for a non-retryable reason.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Every attempt failed with a transient error.
    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Protocol error during communication.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The method does not support the requested operation.
    #[error("{method} transport does not support {operation}")]
    NotSupported {
        method: &'static str,
        operation: &'static str,
    },

    /// Session stdin is gone.
    #[error("Session closed")]
    SessionClosed,
}
