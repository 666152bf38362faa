//! Error types for engine operations and state persistence.

use thiserror::Error;

/// Domain failure from an [`crate::Engine`] operation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("{0} {1} not found")]
    NotFound(&'static str, u64),

    #[error("check-in code {0} not found")]
    UnknownCheckInCode(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("allocation {0} expired")]
    Expired(u64),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

/// Failure reading or writing the state file.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("state file io: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file json: {0}")]
    Json(#[from] serde_json::Error),
}
