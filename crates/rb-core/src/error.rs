//! # AppError
//!
//! Centralized error handling for the Relay-Board ecosystem.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

/// The primary error type for all board operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed, blank or oversized input. Never retried.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Referenced entity is absent (e.g., Message, Comment)
    #[error("{0} not found with ID {1}")]
    NotFound(&'static str, i64),

    /// Banned, unresolvable or untrusted user
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Storage or auth collaborator failed. Safe for the caller to retry.
    #[error("dependency failure: {0}")]
    Dependency(String),
}

impl AppError {
    /// Wraps a port failure, keeping the whole context chain in the message.
    pub fn dependency(err: anyhow::Error) -> Self {
        AppError::Dependency(format!("{err:#}"))
    }

    /// Client errors are the caller's fault; everything else is ours.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AppError::Dependency(_))
    }
}

/// A specialized Result type for Relay-Board logic.
pub type Result<T> = std::result::Result<T, AppError>;
