//! Error types for queue operations

use thiserror::Error;

use crate::types::IdValidationError;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur while talking to a queue backend
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    /// The backend could not be reached (connection refused, dropped, timed out)
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend was reachable but rejected the command
    #[error("Backend error: {0}")]
    Backend(String),

    /// Message serialization failed
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Message deserialization failed
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Agent name is not usable as a queue key
    #[error("Invalid agent id: {0}")]
    InvalidAgentId(#[from] IdValidationError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl QueueError {
    /// Whether this error means the backend itself is gone, as opposed to a
    /// single command failing.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, QueueError::Unavailable(_))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            QueueError::Unavailable(err.to_string())
        } else {
            QueueError::Backend(err.to_string())
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}
