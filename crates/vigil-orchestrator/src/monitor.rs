//! Background loops owned by the orchestrator besides liveness checking:
//! the resource health monitor and the control-queue listener.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_agent::pace_empty_poll;
use vigil_agent::payload::{ORCHESTRATOR, SHUTDOWN};
use vigil_mesh::{AgentId, HealthStatus, MessageQueue};

/// Condition reported by a resource check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceWarning {
    BackendUnhealthy { backend: String, error: String },
    QueueBacklog { agent: AgentId, queue_size: usize },
    DeadLetters { agent: AgentId, dlq_size: usize },
}

/// Probe the backend and queue depths once, logging every warning found.
///
/// Purely observational; nothing is restarted from here.
pub async fn check_resources(
    queue: &MessageQueue,
    queue_size_warning: usize,
) -> Vec<ResourceWarning> {
    let mut warnings = Vec::new();

    let health = queue.health_check().await;
    if let HealthStatus::Unhealthy { error } = &health.status {
        warn!(backend = %health.backend, error = %error, "Queue backend unhealthy");
        warnings.push(ResourceWarning::BackendUnhealthy {
            backend: health.backend.clone(),
            error: error.clone(),
        });
    }

    for (agent, stats) in queue.get_all_queue_stats().await {
        if stats.queue_size > queue_size_warning {
            warn!(agent = %agent, queue_size = stats.queue_size, "Queue size is high");
            warnings.push(ResourceWarning::QueueBacklog {
                agent: agent.clone(),
                queue_size: stats.queue_size,
            });
        }
        if stats.dlq_size > 0 {
            warn!(agent = %agent, dlq_size = stats.dlq_size, "Dead letter queue has messages");
            warnings.push(ResourceWarning::DeadLetters {
                agent,
                dlq_size: stats.dlq_size,
            });
        }
    }

    debug!(warnings = warnings.len(), "Resource check complete");
    warnings
}

/// Run [`check_resources`] every `interval` until `token` is cancelled
pub fn spawn_resource_monitor(
    queue: Arc<MessageQueue>,
    interval: Duration,
    queue_size_warning: usize,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    check_resources(&queue, queue_size_warning).await;
                }
            }
        }
        debug!("Resource monitor stopped");
    })
}

/// Consume `queue:orchestrator` and cancel `token` on a `shutdown` payload
pub fn spawn_control_listener(queue: Arc<MessageQueue>, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Ok(me) = AgentId::parse(ORCHESTRATOR) else {
            return;
        };
        loop {
            let polled_at = Instant::now();
            let message = tokio::select! {
                _ = token.cancelled() => break,
                message = queue.consume(&me) => message,
            };
            let Some(message) = message else {
                if pace_empty_poll(&token, polled_at).await {
                    continue;
                }
                break;
            };
            if message.payload.contains_key(SHUTDOWN) {
                info!(sender = %message.sender, "Shutdown requested via control queue");
                token.cancel();
                break;
            }
            warn!(
                sender = %message.sender,
                kind = message.kind().unwrap_or("<empty>"),
                "Ignoring unknown control message"
            );
        }
        debug!("Control listener stopped");
    })
}
