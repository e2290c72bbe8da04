//! # Vigil
//!
//! Vigil runs a small set of cooperating disaster-response agents on top of
//! a per-recipient message mesh, and supervises them so that a stalled or
//! crashed agent is restarted under a bounded budget.
//!
//! ## Core Components
//!
//! - **[mesh]**: message queues with dead-letter handling over Redis or memory
//! - **[agent]**: the [`Agent`] contract, its runtime and the built-in relay agents
//! - **[orchestrator]**: configuration, liveness checks, restarts and status
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vigil_workspace::{Orchestrator, SystemConfig, cancel_on_signal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SystemConfig::load(SystemConfig::default_path())?;
//!     let mut orchestrator = Orchestrator::connect(config).await;
//!     cancel_on_signal(orchestrator.shutdown_token());
//!     orchestrator.run().await?;
//!     Ok(())
//! }
//! ```

pub use vigil_agent as agent;
pub use vigil_mesh as mesh;
pub use vigil_orchestrator as orchestrator;

pub use vigil_agent::{Agent, AgentContext, AgentError, AgentHandle, AgentRegistry};
pub use vigil_mesh::{AgentId, Delivery, MessageQueue, Payload, QueueConfig, QueueMessage};
pub use vigil_orchestrator::{
    AgentState, Orchestrator, OrchestratorState, SystemConfig, SystemStatus, cancel_on_signal,
};
