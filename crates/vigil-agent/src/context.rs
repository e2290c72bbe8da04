//! Per-instance runtime handle given to an agent's processing loop.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use vigil_mesh::{AgentId, Delivery, MessageQueue, Payload, QueueMessage};

/// Default interval between heartbeats
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Liveness signal published by a running agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    /// Monotonic time of the beat, used for timeout checks
    pub at: Instant,
    /// Wall-clock time of the beat, used for reporting
    pub timestamp: DateTime<Utc>,
    pub processed_count: u64,
    pub error_count: u64,
}

impl Heartbeat {
    fn now(processed_count: u64, error_count: u64) -> Self {
        Self {
            at: Instant::now(),
            timestamp: Utc::now(),
            processed_count,
            error_count,
        }
    }
}

/// Everything an agent instance needs to talk to the outside world.
///
/// One context exists per agent instance; a restarted agent gets a fresh
/// context seeded with the previous instance's counters.
pub struct AgentContext {
    name: AgentId,
    queue: Option<Arc<MessageQueue>>,
    cancel: CancellationToken,
    heartbeat_interval: Duration,
    heartbeat: watch::Sender<Heartbeat>,
    processed: AtomicU64,
    errors: AtomicU64,
}

impl AgentContext {
    pub fn new(name: AgentId, queue: Option<Arc<MessageQueue>>) -> Self {
        let (heartbeat, _) = watch::channel(Heartbeat::now(0, 0));
        Self {
            name,
            queue,
            cancel: CancellationToken::new(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat,
            processed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Cancel this context together with `parent`
    pub fn with_parent_token(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Start counting from a previous instance's totals
    pub fn with_counters(self, processed: u64, errors: u64) -> Self {
        self.processed.store(processed, Ordering::Relaxed);
        self.errors.store(errors, Ordering::Relaxed);
        self.heartbeat.send_replace(Heartbeat::now(processed, errors));
        self
    }

    pub fn name(&self) -> &AgentId {
        &self.name
    }

    pub fn queue(&self) -> Option<&Arc<MessageQueue>> {
        self.queue.as_ref()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Token observed by the heartbeat and processing loops
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Ask the loops to exit at their next suspension point
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Resolves once [`stop`](Self::stop) has been called
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Receive every heartbeat this instance publishes
    pub fn subscribe_heartbeats(&self) -> watch::Receiver<Heartbeat> {
        self.heartbeat.subscribe()
    }

    /// Publish a heartbeat carrying the current counters
    pub fn beat(&self) -> Heartbeat {
        let beat = Heartbeat::now(self.processed_count(), self.error_count());
        self.heartbeat.send_replace(beat);
        debug!(agent = %self.name, processed = beat.processed_count, "Heartbeat");
        beat
    }

    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish `payload` to `recipient` with this agent as sender.
    ///
    /// Returns `None` (after logging) when no queue service is attached.
    pub async fn send_message(&self, recipient: &AgentId, payload: Payload) -> Option<Delivery> {
        let Some(queue) = &self.queue else {
            error!(agent = %self.name, recipient = %recipient, "No message queue attached, dropping message");
            return None;
        };
        Some(queue.publish(&self.name, recipient, payload).await)
    }

    /// Send `payload` and report whether it reached `recipient`'s queue.
    ///
    /// Dead-lettered or dropped sends are logged and yield `false`.
    pub async fn forward(&self, recipient: &AgentId, payload: Payload) -> bool {
        match self.send_message(recipient, payload).await {
            Some(Delivery::Enqueued(_)) => true,
            Some(Delivery::DeadLettered(id)) => {
                warn!(
                    agent = %self.name,
                    recipient = %recipient,
                    message_id = %id,
                    "Forwarded message was dead-lettered"
                );
                false
            }
            None => false,
        }
    }

    /// Take the next message addressed to this agent, waiting up to the
    /// queue's consume timeout
    pub async fn receive_message(&self) -> Option<QueueMessage> {
        match &self.queue {
            Some(queue) => queue.consume(&self.name).await,
            None => {
                error!(agent = %self.name, "No message queue attached");
                None
            }
        }
    }

    /// Drain up to `batch_size` waiting messages without blocking
    pub async fn receive_batch(&self, batch_size: usize) -> Vec<QueueMessage> {
        match &self.queue {
            Some(queue) => queue.consume_batch(&self.name, batch_size).await,
            None => Vec::new(),
        }
    }

    /// Hand a message back to the queue service's retry path
    pub async fn retry(&self, message: QueueMessage) -> bool {
        match &self.queue {
            Some(queue) => queue.retry_message(message).await,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vigil_mesh::QueueConfig;

    fn agent(name: &str) -> AgentId {
        AgentId::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_send_tags_sender() {
        let queue = Arc::new(MessageQueue::in_memory(QueueConfig::default()));
        let ctx = AgentContext::new(agent("watchtower"), Some(queue.clone()));

        let mut payload = Payload::new();
        payload.insert("ping".into(), json!(1));
        let delivery = ctx.send_message(&agent("auditor"), payload).await.unwrap();
        assert!(delivery.is_enqueued());

        let message = queue.consume(&agent("auditor")).await.unwrap();
        assert_eq!(message.sender, agent("watchtower"));
    }

    #[tokio::test]
    async fn test_forward_reports_delivery() {
        let queue = Arc::new(MessageQueue::in_memory(QueueConfig::default()));
        let ctx = AgentContext::new(agent("watchtower"), Some(queue.clone()));
        assert!(ctx.forward(&agent("auditor"), Payload::new()).await);
        assert_eq!(queue.get_queue_size(&agent("auditor")).await, 1);

        let detached = AgentContext::new(agent("watchtower"), None);
        assert!(!detached.forward(&agent("auditor"), Payload::new()).await);
    }

    #[tokio::test]
    async fn test_send_without_queue_is_noop() {
        let ctx = AgentContext::new(agent("watchtower"), None);
        assert!(ctx.send_message(&agent("auditor"), Payload::new()).await.is_none());
        assert!(ctx.receive_batch(5).await.is_empty());
        assert!(!ctx.retry(QueueMessage::new(agent("a"), agent("b"), Payload::new())).await);
    }

    #[test]
    fn test_heartbeat_carries_counters() {
        let ctx = AgentContext::new(agent("auditor"), None).with_counters(4, 1);
        let mut heartbeats = ctx.subscribe_heartbeats();

        ctx.record_processed();
        ctx.record_error();
        ctx.beat();

        assert!(heartbeats.has_changed().unwrap());
        let beat = *heartbeats.borrow_and_update();
        assert_eq!(beat.processed_count, 5);
        assert_eq!(beat.error_count, 2);
    }

    #[test]
    fn test_child_token_follows_parent() {
        let parent = CancellationToken::new();
        let ctx = AgentContext::new(agent("auditor"), None).with_parent_token(&parent);
        assert!(ctx.is_running());
        parent.cancel();
        assert!(!ctx.is_running());
    }
}
