//! Core domain errors.

use thiserror::Error;

/// Core domain errors for Relay.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Worker not found.
    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    /// Provider is not part of the catalog.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Communication method string is not one of acp, cli, api.
    #[error("Invalid communication method '{0}' (expected acp, cli or api)")]
    InvalidMethod(String),

    /// Output filter failed to compile.
    #[error("invalid regex pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Timestamp could not be parsed as RFC 3339.
    #[error("Invalid timestamp format '{0}' (expected RFC 3339)")]
    InvalidTimestamp(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
