use thiserror::Error;
use tracing::error;

use directory_cell::DirectoryError;
use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Patient already holds a token in this queue: {0}")]
    DuplicateBooking(String),

    #[error("Concurrent update detected on {0}")]
    ConcurrencyConflict(String),

    #[error("Invalid token status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Redis connection error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
}

impl QueueError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, QueueError::ConcurrencyConflict(_))
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound(msg) => AppError::NotFound(msg),
            QueueError::ValidationError(msg) => AppError::ValidationError(msg),
            QueueError::Forbidden(msg) => AppError::Forbidden(msg),
            e @ QueueError::DuplicateBooking(_) => AppError::Conflict(e.to_string()),
            e @ QueueError::ConcurrencyConflict(_) => AppError::Conflict(e.to_string()),
            e @ QueueError::InvalidStatusTransition { .. } => AppError::Conflict(e.to_string()),
            QueueError::Directory(e) => {
                error!("Profile directory failure: {}", e);
                AppError::ExternalService("Profile directory unavailable".to_string())
            }
            e => {
                error!("Queue storage failure: {}", e);
                AppError::Internal("Operation failed".to_string())
            }
        }
    }
}
