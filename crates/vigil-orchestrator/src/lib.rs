//! # Vigil Orchestrator
//!
//! Supervises Vigil agents: starts every enabled agent, watches heartbeats
//! and task liveness, restarts failed agents under a bounded budget, and
//! reports system status.
//!
//! ## Example
//!
//! ```rust,no_run
//! use vigil_orchestrator::{Orchestrator, SystemConfig, cancel_on_signal};
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

pub mod config;
pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod signal;
pub mod status;

pub use config::{
    AgentSettings, ConfigError, DEFAULT_CONFIG_PATH, MonitoringSettings, QueueSettings,
    RedisSettings, SystemConfig,
};
pub use error::{OrchestratorError, OrchestratorResult};
pub use monitor::{ResourceWarning, check_resources};
pub use orchestrator::Orchestrator;
pub use signal::{cancel_on_signal, shutdown_signal};
pub use status::{AgentState, AgentStatus, OrchestratorState, SystemStatus};
