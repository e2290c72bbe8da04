//! The agent trait shared by every supervised worker.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use vigil_mesh::{Payload, QueueMessage};

use crate::context::AgentContext;
use crate::error::AgentResult;

/// A supervised worker with its own inbound queue.
///
/// Implementations differ only in how they interpret payloads. The default
/// [`processing_loop`](Agent::processing_loop) drains the agent's queue and
/// feeds each payload to [`process_message`](Agent::process_message);
/// override it only for agents that need a different consumption pattern.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent type name, used in logs
    fn name(&self) -> &str;

    /// Handle one payload.
    ///
    /// Returns `Ok(None)` for payloads this agent does not understand. Any
    /// follow-up messages are sent through `ctx`.
    async fn process_message(
        &self,
        payload: &Payload,
        ctx: &AgentContext,
    ) -> AgentResult<Option<Payload>>;

    /// Consume and handle messages until the context is stopped.
    ///
    /// The stop flag is checked between messages; a message already being
    /// handled runs to completion.
    async fn processing_loop(&self, ctx: &AgentContext) {
        while ctx.is_running() {
            let polled_at = Instant::now();
            match ctx.receive_message().await {
                Some(message) => handle_message(self, ctx, message).await,
                None => {
                    if !pace_empty_poll(ctx.cancellation_token(), polled_at).await {
                        break;
                    }
                }
            }
        }
        debug!(agent = %ctx.name(), "Processing loop finished");
    }
}

/// Shortest time between two polls of an empty queue
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Wait out the rest of [`MIN_POLL_INTERVAL`] after a poll that started at
/// `polled_at` came back empty.
///
/// A consume that failed fast (backend error, no queue attached) would
/// otherwise be retried in a tight loop. Returns `false` if `token` was
/// cancelled while waiting.
pub async fn pace_empty_poll(token: &CancellationToken, polled_at: Instant) -> bool {
    let elapsed = polled_at.elapsed();
    if elapsed >= MIN_POLL_INTERVAL {
        return !token.is_cancelled();
    }
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(MIN_POLL_INTERVAL - elapsed) => true,
    }
}

/// Run one message through `agent`, updating counters and logging the
/// outcome. Handler errors never escape.
pub async fn handle_message<A: Agent + ?Sized>(
    agent: &A,
    ctx: &AgentContext,
    message: QueueMessage,
) {
    match agent.process_message(&message.payload, ctx).await {
        Ok(Some(result)) => {
            ctx.record_processed();
            debug!(
                agent = agent.name(),
                message_id = %message.message_id,
                result = %serde_json::Value::Object(result),
                "Message processed"
            );
        }
        Ok(None) => {
            ctx.record_processed();
            debug!(
                agent = agent.name(),
                message_id = %message.message_id,
                kind = message.kind().unwrap_or("<empty>"),
                "Ignoring message with unknown payload"
            );
        }
        Err(e) if e.is_transient() => {
            ctx.record_error();
            warn!(
                agent = agent.name(),
                message_id = %message.message_id,
                error = %e,
                "Transient failure, scheduling retry"
            );
            ctx.retry(message).await;
        }
        Err(e) => {
            ctx.record_error();
            error!(
                agent = agent.name(),
                message_id = %message.message_id,
                error = %e,
                "Error processing message"
            );
        }
    }
}
