//! Agent supervision.
//!
//! The orchestrator owns the shared queue service and a table of agent
//! records. It starts every enabled agent, checks liveness on a fixed
//! interval and restarts agents whose task ended or whose heartbeat went
//! stale, up to `max_restarts` times per agent.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vigil_agent::{Agent, AgentContext, AgentHandle, AgentRegistry, AgentResult};
use vigil_mesh::{AgentId, MessageQueue};

use crate::config::{AgentSettings, SystemConfig};
use crate::error::OrchestratorResult;
use crate::monitor::{spawn_control_listener, spawn_resource_monitor};
use crate::status::{AgentState, AgentStatus, OrchestratorState, SystemStatus};

/// How long shutdown waits for each agent to finish
const AGENT_STOP_GRACE: Duration = Duration::from_secs(10);

struct AgentRecord {
    settings: AgentSettings,
    handle: Option<AgentHandle>,
    status: AgentStatus,
}

impl AgentRecord {
    /// Copy the live heartbeat and counters into the status record
    fn refresh(&mut self) {
        self.status = self.snapshot();
    }

    fn snapshot(&self) -> AgentStatus {
        let mut status = self.status.clone();
        if let Some(handle) = &self.handle {
            status.last_heartbeat = handle.last_heartbeat().timestamp;
            status.processed_count = handle.processed_count();
            status.error_count = handle.error_count();
        }
        status
    }
}

/// Why an agent needs restarting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LivenessFailure {
    TaskEnded,
    HeartbeatTimeout(Duration),
    NotRunning,
}

/// Supervisor for a set of agents sharing one message queue
pub struct Orchestrator {
    config: SystemConfig,
    registry: AgentRegistry,
    queue: Arc<MessageQueue>,
    agents: BTreeMap<AgentId, AgentRecord>,
    shutdown: CancellationToken,
    state: OrchestratorState,
    background: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// Create an orchestrator around an existing queue service
    pub fn new(config: SystemConfig, registry: AgentRegistry, queue: Arc<MessageQueue>) -> Self {
        Self {
            config,
            registry,
            queue,
            agents: BTreeMap::new(),
            shutdown: CancellationToken::new(),
            state: OrchestratorState::Initialized,
            background: Vec::new(),
        }
    }

    /// Connect the queue service described by `config` (falling back to
    /// memory) and create an orchestrator with the built-in agents
    pub async fn connect(config: SystemConfig) -> Self {
        let queue = MessageQueue::connect(config.redis_config(), config.queue_config()).await;
        Self::new(config, AgentRegistry::with_builtin_agents(), Arc::new(queue))
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Token that stops [`run`](Self::run) when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run an already-built agent instance under a fresh context
    fn launch_agent(
        &self,
        name: &AgentId,
        settings: &AgentSettings,
        agent: Arc<dyn Agent>,
        counters: (u64, u64),
    ) -> AgentHandle {
        let ctx = AgentContext::new(name.clone(), Some(Arc::clone(&self.queue)))
            .with_parent_token(&self.shutdown)
            .with_heartbeat_interval(settings.heartbeat_interval())
            .with_counters(counters.0, counters.1);
        AgentHandle::spawn(agent, ctx)
    }

    /// Build one agent instance and spawn it
    fn spawn_agent(
        &self,
        name: &AgentId,
        settings: &AgentSettings,
        counters: (u64, u64),
    ) -> AgentResult<AgentHandle> {
        let agent = self.registry.create(name.as_str(), &settings.options)?;
        Ok(self.launch_agent(name, settings, agent, counters))
    }

    fn supervise(&mut self, name: AgentId, settings: AgentSettings, handle: AgentHandle) {
        info!(agent = %name, "Started agent");
        let record = AgentRecord {
            settings,
            handle: Some(handle),
            status: AgentStatus::new(name.clone()),
        };
        self.agents.insert(name, record);
    }

    /// Start every enabled agent.
    ///
    /// Every enabled agent is built from its factory and options first; if
    /// any of them fails, nothing is started.
    pub fn start_agents(&mut self) -> OrchestratorResult<()> {
        let mut built = Vec::new();
        for (name, settings) in self.config.enabled_agents() {
            let id = AgentId::parse(name).map_err(vigil_mesh::QueueError::from)?;
            let agent = self.registry.create(name, &settings.options)?;
            built.push((id, settings.clone(), agent));
        }

        for (name, settings, agent) in built {
            let handle = self.launch_agent(&name, &settings, agent, (0, 0));
            self.supervise(name, settings, handle);
        }
        info!(agents = self.agents.len(), "Agents started");
        Ok(())
    }

    /// Start a single agent and begin supervising it
    pub fn start_agent(&mut self, name: AgentId, settings: AgentSettings) -> OrchestratorResult<()> {
        let handle = self.spawn_agent(&name, &settings, (0, 0))?;
        self.supervise(name, settings, handle);
        Ok(())
    }

    /// Start agents and supervise them until the shutdown token is cancelled
    /// (by a signal, a control-queue `shutdown` message, or the caller).
    pub async fn run(&mut self) -> OrchestratorResult<()> {
        info!("Starting orchestrator");
        self.state = OrchestratorState::Running;

        if let Err(e) = self.start_agents() {
            error!(error = %e, "Failed to start agents");
            self.shutdown().await;
            return Err(e);
        }

        let monitoring = &self.config.monitoring;
        self.background.push(spawn_resource_monitor(
            Arc::clone(&self.queue),
            monitoring.resource_check_interval(),
            monitoring.queue_size_warning,
            self.shutdown.child_token(),
        ));
        self.background.push(spawn_control_listener(
            Arc::clone(&self.queue),
            self.shutdown.clone(),
        ));

        let shutdown = self.shutdown.clone();
        let interval = self.config.monitoring.health_check_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Orchestrator running");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.check_agent_health().await,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Run one liveness pass over every supervised agent
    pub async fn check_agent_health(&mut self) {
        let timeout = self.config.monitoring.heartbeat_timeout();
        let now = Instant::now();

        let mut failing = Vec::new();
        for (name, record) in self.agents.iter_mut() {
            if !record.status.status.is_supervised() {
                continue;
            }
            record.refresh();

            let failure = match &record.handle {
                None => Some(LivenessFailure::NotRunning),
                Some(handle) if handle.is_finished() => Some(LivenessFailure::TaskEnded),
                Some(handle) => {
                    let silent = now.saturating_duration_since(handle.last_heartbeat().at);
                    (silent > timeout).then_some(LivenessFailure::HeartbeatTimeout(silent))
                }
            };

            match failure {
                Some(LivenessFailure::TaskEnded) => {
                    warn!(agent = %name, "Agent task terminated unexpectedly");
                    failing.push(name.clone());
                }
                Some(LivenessFailure::HeartbeatTimeout(silent)) => {
                    warn!(agent = %name, silent_secs = silent.as_secs(), "Agent missed heartbeat");
                    failing.push(name.clone());
                }
                Some(LivenessFailure::NotRunning) => failing.push(name.clone()),
                None => debug!(agent = %name, "Agent healthy"),
            }
        }

        for name in failing {
            if self.shutdown.is_cancelled() {
                break;
            }
            self.restart_agent(&name).await;
        }
    }

    /// Restart `name`, or mark it failed once its restart budget is spent
    async fn restart_agent(&mut self, name: &AgentId) {
        let max_restarts = self.config.monitoring.max_restarts;
        let delay = self.config.monitoring.restart_delay();

        let Some(record) = self.agents.get_mut(name) else {
            return;
        };
        record.refresh();

        if record.status.restart_count >= max_restarts {
            error!(agent = %name, max_restarts, "Agent exceeded max restarts, giving up");
            record.status.status = AgentState::Failed;
            if let Some(handle) = record.handle.take() {
                handle.abort();
            }
            return;
        }

        info!(agent = %name, attempt = record.status.restart_count + 1, "Restarting agent");
        if let Some(handle) = record.handle.take() {
            handle.abort();
        }
        let counters = (record.status.processed_count, record.status.error_count);
        let settings = record.settings.clone();

        tokio::select! {
            _ = self.shutdown.cancelled() => {
                debug!(agent = %name, "Shutdown during restart delay, not restarting");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let spawned = self.spawn_agent(name, &settings, counters);
        let Some(record) = self.agents.get_mut(name) else {
            return;
        };
        record.status.restart_count += 1;
        match spawned {
            Ok(handle) => {
                record.handle = Some(handle);
                record.status.status = AgentState::Running;
                record.status.last_heartbeat = Utc::now();
                info!(agent = %name, restart_count = record.status.restart_count, "Agent restarted");
            }
            Err(e) => {
                record.status.status = AgentState::Error;
                error!(agent = %name, error = %e, "Failed to restart agent");
            }
        }
    }

    /// Stop monitoring, stop every agent and disconnect the queue service
    pub async fn shutdown(&mut self) {
        if self.state == OrchestratorState::Stopped {
            return;
        }
        info!("Shutting down orchestrator");
        self.state = OrchestratorState::ShuttingDown;
        self.shutdown.cancel();

        for task in self.background.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Monitoring task ended abnormally");
            }
        }

        for (name, record) in self.agents.iter_mut() {
            record.refresh();
            if let Some(handle) = record.handle.take() {
                info!(agent = %name, "Stopping agent");
                if tokio::time::timeout(AGENT_STOP_GRACE, handle.shutdown())
                    .await
                    .is_err()
                {
                    warn!(agent = %name, "Agent did not stop in time");
                }
            }
            if record.status.status != AgentState::Failed {
                record.status.status = AgentState::Stopped;
            }
        }

        self.queue.disconnect().await;
        self.state = OrchestratorState::Stopped;
        info!("Orchestrator shutdown complete");
    }

    /// Status record of one agent
    pub fn agent_status(&self, name: &AgentId) -> Option<AgentStatus> {
        self.agents.get(name).map(AgentRecord::snapshot)
    }

    /// Full status report, including live queue statistics
    pub async fn system_status(&self) -> SystemStatus {
        let agents: BTreeMap<AgentId, AgentStatus> = self
            .agents
            .iter()
            .map(|(name, record)| (name.clone(), record.snapshot()))
            .collect();
        let running_agents = agents
            .values()
            .filter(|status| status.status == AgentState::Running)
            .count();

        SystemStatus {
            orchestrator_status: self.state,
            total_agents: agents.len(),
            running_agents,
            agents,
            queue_stats: self.queue.get_all_queue_stats().await,
            backend_health: self.queue.health_check().await,
            degraded: self.queue.is_degraded(),
            last_updated: Utc::now(),
        }
    }
}
