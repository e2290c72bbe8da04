//! Error types for agents and the agent registry.

use thiserror::Error;
use vigil_mesh::QueueError;

/// Errors raised while building agents or handling their messages.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A handler could not make sense of a payload.
    #[error("Processing failed: {0}")]
    Processing(String),

    /// The queue service reported a failure.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// No factory is registered under this name.
    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    /// Agent options were rejected by its factory.
    #[error("Invalid configuration for agent '{agent}': {reason}")]
    Configuration { agent: String, reason: String },
}

impl AgentError {
    /// Whether re-delivering the same message may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::Queue(_))
    }
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
