//! Error surface of the workflow services.

use thiserror::Error;

use tradeledger_core::DomainError;

use crate::store::StoreError;

/// What a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed input; nothing was written.
    Validation,
    /// A referenced document, BOM or order does not exist.
    NotFound,
    /// A business rule rejected the operation; nothing was written.
    Conflict,
    /// The durable store failed. Safe to retry.
    Storage,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            EngineError::Validation(msg)
            | EngineError::NotFound(msg)
            | EngineError::Conflict(msg)
            | EngineError::Storage(msg) => msg,
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                EngineError::Validation(msg)
            }
            DomainError::NotFound(msg) => EngineError::NotFound(msg),
            DomainError::Conflict(msg) | DomainError::InvariantViolation(msg) => {
                EngineError::Conflict(msg)
            }
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => {
                EngineError::Conflict(format!("document was modified concurrently: {msg}"))
            }
            err @ StoreError::InsufficientStock { .. } => EngineError::Conflict(err.to_string()),
            StoreError::OutOfRange(msg) => EngineError::Validation(msg),
            StoreError::InvalidAppend(msg) | StoreError::AggregateTypeMismatch(msg) => {
                EngineError::Storage(msg)
            }
            StoreError::Unavailable(msg) => EngineError::Storage(msg),
        }
    }
}
