//! Agent and system status reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use vigil_mesh::{AgentId, BackendHealth, QueueStats};

/// Supervision state of one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Task is alive and being watched
    Running,
    /// Stopped by orchestrator shutdown
    Stopped,
    /// Last (re)start attempt could not build the agent; will be retried
    Error,
    /// Restart budget exhausted; never restarted again
    Failed,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Running => "running",
            AgentState::Stopped => "stopped",
            AgentState::Error => "error",
            AgentState::Failed => "failed",
        }
    }

    /// Whether the liveness loop still supervises this agent
    pub fn is_supervised(&self) -> bool {
        matches!(self, AgentState::Running | AgentState::Error)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supervision record for one agent.
///
/// Created when the agent is first started and kept until the orchestrator
/// exits; counters carry over across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent_name: AgentId,
    pub status: AgentState,
    pub last_heartbeat: DateTime<Utc>,
    pub processed_count: u64,
    pub error_count: u64,
    pub restart_count: u32,
}

impl AgentStatus {
    pub fn new(agent_name: AgentId) -> Self {
        Self {
            agent_name,
            status: AgentState::Running,
            last_heartbeat: Utc::now(),
            processed_count: 0,
            error_count: 0,
            restart_count: 0,
        }
    }
}

/// Lifecycle of the orchestrator itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Initialized,
    Running,
    ShuttingDown,
    Stopped,
}

/// Point-in-time view of the whole system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub orchestrator_status: OrchestratorState,
    pub agents: BTreeMap<AgentId, AgentStatus>,
    pub total_agents: usize,
    pub running_agents: usize,
    pub queue_stats: BTreeMap<AgentId, QueueStats>,
    pub backend_health: BackendHealth,
    /// Whether the queue service fell back to in-memory storage
    pub degraded: bool,
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_value(AgentState::Failed).unwrap(),
            serde_json::json!("failed")
        );
        assert_eq!(AgentState::Error.to_string(), "error");
        assert!(AgentState::Error.is_supervised());
        assert!(!AgentState::Failed.is_supervised());
    }

    #[test]
    fn test_new_status_is_running() {
        let status = AgentStatus::new(AgentId::parse("auditor").unwrap());
        assert_eq!(status.status, AgentState::Running);
        assert_eq!(status.restart_count, 0);
    }
}
