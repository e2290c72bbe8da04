//! # Vigil Agent
//!
//! The lifecycle contract shared by every Vigil agent, plus the built-in
//! relay agents.
//!
//! An agent is a long-running worker that owns one inbound queue. It only
//! talks to other agents by publishing payloads through the shared
//! [`MessageQueue`](vigil_mesh::MessageQueue); it never calls them directly.
//!
//! - [`Agent`] - per-agent behaviour: `process_message` and an overridable
//!   `processing_loop`
//! - [`AgentContext`] - queue access, stop flag, heartbeat publisher and counters
//! - [`AgentHandle`] - a spawned agent running its heartbeat and processing loops
//! - [`AgentRegistry`] - factories keyed by agent type name

pub mod agent;
pub mod agents;
pub mod context;
pub mod error;
pub mod payload;
pub mod registry;
pub mod runtime;

pub use agent::{Agent, MIN_POLL_INTERVAL, handle_message, pace_empty_poll};
pub use agents::{AuditorAgent, TreasurerAgent, WatchtowerAgent};
pub use context::{AgentContext, DEFAULT_HEARTBEAT_INTERVAL, Heartbeat};
pub use error::{AgentError, AgentResult};
pub use registry::{AgentFactory, AgentOptions, AgentRegistry};
pub use runtime::{AgentHandle, start};
