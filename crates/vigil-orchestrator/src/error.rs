//! Orchestrator error types

use thiserror::Error;
use vigil_agent::AgentError;
use vigil_mesh::QueueError;

use crate::config::ConfigError;

/// Errors surfaced by the orchestrator
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Signal handling error: {0}")]
    Signal(String),
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
