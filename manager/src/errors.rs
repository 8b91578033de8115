//! Error types for the queue manager
//!
//! Domain errors are grouped by the layer that raises them. Application
//! plumbing (config loading, persistence, startup) uses `anyhow` and wraps
//! these where a caller needs to match on the failure.

use thiserror::Error;

/// Main error type for the queue manager
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Alert error: {0}")]
    Alert(#[from] AlertError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for ManagerError {
    fn from(err: anyhow::Error) -> Self {
        ManagerError::Other(format!("{:#}", err))
    }
}

/// Errors raised by queue service adapters
#[derive(Debug, Error)]
pub enum QueueError {
    /// The adapter has no live backend connection
    #[error("Queue service is not connected")]
    NotConnected,

    #[error("Job '{job_id}' not found in queue '{queue}'")]
    JobNotFound { queue: String, job_id: String },

    #[error("Job '{job_id}' in queue '{queue}' is {state}, expected {expected}")]
    InvalidJobState {
        queue: String,
        job_id: String,
        state: String,
        expected: String,
    },

    #[error("Queue '{queue}' not found")]
    QueueNotFound { queue: String },

    #[error("Backend error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Timed out while {operation}")]
    Timeout { operation: String },

    #[error("Invalid connection URL: {reason}")]
    InvalidUrl { reason: String },
}

/// Errors raised by the connection manager
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection '{id}' not found")]
    NotFound { id: String },

    #[error("Connection '{id}' already exists")]
    AlreadyExists { id: String },

    /// The connection exists but is not currently usable
    #[error("Connection '{id}' is not available (state: {state})")]
    Unavailable { id: String, state: String },
}

/// Errors raised by alert management and evaluation
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Alert '{id}' not found")]
    NotFound { id: String },

    #[error("Invalid value for '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("Queue read failed during evaluation: {0}")]
    Backend(#[from] QueueError),
}

/// Configuration error variants
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Missing required field: {field}")]
    MissingRequired { field: String },
}

impl AlertError {
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        AlertError::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;
