//! Agent lifecycle: heartbeat loop plus processing loop on one task.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use vigil_mesh::AgentId;

use crate::agent::Agent;
use crate::context::{AgentContext, Heartbeat};

/// Run `agent` until its context is stopped.
///
/// The heartbeat loop and the processing loop run concurrently; this returns
/// once both have finished. If the processing loop ends on its own the
/// context is stopped so the heartbeat loop ends too.
pub async fn start(agent: &dyn Agent, ctx: &AgentContext) {
    info!(agent = %ctx.name(), "Agent started");

    tokio::join!(heartbeat_loop(ctx), async {
        agent.processing_loop(ctx).await;
        ctx.stop();
    });

    info!(agent = %ctx.name(), "Agent stopped");
}

async fn heartbeat_loop(ctx: &AgentContext) {
    loop {
        ctx.beat();
        tokio::select! {
            _ = ctx.cancelled() => break,
            _ = tokio::time::sleep(ctx.heartbeat_interval()) => {}
        }
    }
    debug!(agent = %ctx.name(), "Heartbeat loop finished");
}

/// A running agent instance on its own task
pub struct AgentHandle {
    ctx: Arc<AgentContext>,
    heartbeats: watch::Receiver<Heartbeat>,
    task: JoinHandle<()>,
}

impl AgentHandle {
    /// Spawn `agent` with `ctx` on a new task
    pub fn spawn(agent: Arc<dyn Agent>, ctx: AgentContext) -> Self {
        let ctx = Arc::new(ctx);
        let heartbeats = ctx.subscribe_heartbeats();
        let task = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { start(agent.as_ref(), &ctx).await })
        };
        Self {
            ctx,
            heartbeats,
            task,
        }
    }

    pub fn name(&self) -> &AgentId {
        self.ctx.name()
    }

    /// Most recent heartbeat
    pub fn last_heartbeat(&self) -> Heartbeat {
        *self.heartbeats.borrow()
    }

    pub fn processed_count(&self) -> u64 {
        self.ctx.processed_count()
    }

    pub fn error_count(&self) -> u64 {
        self.ctx.error_count()
    }

    /// Whether the agent's task has ended (normally, by panic, or by abort)
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the agent to stop at its next suspension point
    pub fn stop(&self) {
        self.ctx.stop();
    }

    /// Stop the agent and wait for its task to end
    pub async fn shutdown(self) {
        self.ctx.stop();
        match self.task.await {
            Err(e) if e.is_panic() => error!(agent = %self.ctx.name(), "Agent task panicked"),
            Err(_) | Ok(()) => {}
        }
    }

    /// Stop the agent and cancel its task without waiting
    pub fn abort(self) {
        self.ctx.stop();
        self.task.abort();
    }
}
