//! Message queue service used by agents and the orchestrator.
//!
//! Each agent owns one inbound queue (`queue:{agent}`) and one dead letter
//! queue (`queue:{agent}:dlq`). The service never lets a backend failure
//! escape to its caller: publish failures become DLQ entries, consume
//! failures become empty results, and an unreachable backend is swapped for
//! an in-memory one for the rest of the process lifetime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::backend::{MemoryBackend, QueueBackend};
use crate::dlq::{DeadLetterSpill, DlqEntry};
use crate::error::{QueueError, QueueResult};
use crate::health::BackendHealth;
use crate::message::{MessageId, Payload, QueueMessage};
use crate::types::{AgentId, DLQ_SUFFIX, QUEUE_PREFIX};

/// Tunables for the queue service
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Retries allowed before `retry_message` drops a message
    pub max_retries: u32,
    /// Base delay for linear retry backoff
    pub retry_delay: Duration,
    /// How long `consume` waits for a message
    pub consume_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            consume_timeout: Duration::from_secs(1),
        }
    }
}

/// Where a published message ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Pushed onto the recipient's queue
    Enqueued(MessageId),
    /// Recorded in the recipient's dead letter queue instead
    DeadLettered(MessageId),
}

impl Delivery {
    pub fn message_id(&self) -> &MessageId {
        match self {
            Delivery::Enqueued(id) | Delivery::DeadLettered(id) => id,
        }
    }

    pub fn is_enqueued(&self) -> bool {
        matches!(self, Delivery::Enqueued(_))
    }
}

/// Snapshot of one agent's queues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_size: usize,
    pub dlq_size: usize,
    pub last_updated: DateTime<Utc>,
}

/// Per-recipient queues on top of a swappable [`QueueBackend`]
pub struct MessageQueue {
    backend: RwLock<Arc<dyn QueueBackend>>,
    degraded: AtomicBool,
    spill: DeadLetterSpill,
    config: QueueConfig,
}

impl MessageQueue {
    /// Wrap an already-connected backend
    pub fn new(backend: Arc<dyn QueueBackend>, config: QueueConfig) -> Self {
        Self {
            backend: RwLock::new(backend),
            degraded: AtomicBool::new(false),
            spill: DeadLetterSpill::new(),
            config,
        }
    }

    /// Queue service backed purely by process memory
    pub fn in_memory(config: QueueConfig) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), config)
    }

    /// Connect to Redis, falling back to the in-memory backend if the server
    /// cannot be reached.
    #[cfg(feature = "redis")]
    pub async fn connect(redis: crate::backend::RedisConfig, config: QueueConfig) -> Self {
        Self::connect_with(
            async move {
                let backend = crate::backend::RedisBackend::with_config(redis).await?;
                Ok(Arc::new(backend) as Arc<dyn QueueBackend>)
            },
            config,
        )
        .await
    }

    /// Run `connect` and use its backend, or the in-memory backend if it fails
    pub async fn connect_with<F>(connect: F, config: QueueConfig) -> Self
    where
        F: Future<Output = QueueResult<Arc<dyn QueueBackend>>>,
    {
        match connect.await {
            Ok(backend) => {
                info!(backend = backend.name(), "Connected to message queue backend");
                Self::new(backend, config)
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect to message queue backend");
                info!("Falling back to in-memory queue backend");
                let queue = Self::in_memory(config);
                queue.degraded.store(true, Ordering::SeqCst);
                queue
            }
        }
    }

    /// Current backend. The handle is cloned so no lock is held across
    /// backend calls.
    async fn backend(&self) -> Arc<dyn QueueBackend> {
        Arc::clone(&*self.backend.read().await)
    }

    /// Name of the backend currently in use
    pub async fn backend_name(&self) -> &'static str {
        self.backend().await.name()
    }

    /// Whether the service has fallen back to the in-memory backend
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Switch to in-memory storage after the backend became unreachable.
    /// One-way: the original backend is never restored.
    async fn degrade(&self, cause: &QueueError) {
        let mut backend = self.backend.write().await;
        if self.degraded.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(
            backend = backend.name(),
            error = %cause,
            "Queue backend unreachable, falling back to in-memory backend"
        );
        *backend = Arc::new(MemoryBackend::new());
    }

    async fn observe(&self, err: &QueueError) {
        if err.is_unavailable() {
            self.degrade(err).await;
        }
    }

    /// Release backend connections
    pub async fn disconnect(&self) {
        let backend = self.backend().await;
        backend.close().await;
        info!(backend = backend.name(), "Disconnected from message queue backend");
    }

    /// Publish a payload to `recipient`'s queue.
    ///
    /// Never fails: if the push is rejected the message goes to the
    /// recipient's DLQ with the error text attached.
    pub async fn publish(&self, sender: &AgentId, recipient: &AgentId, payload: Payload) -> Delivery {
        let message = QueueMessage::new(sender.clone(), recipient.clone(), payload);
        self.enqueue(message).await
    }

    /// Publish a fully built message (keeps its ID and retry count)
    pub async fn enqueue(&self, message: QueueMessage) -> Delivery {
        let id = message.message_id.clone();

        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!(message_id = %id, error = %e, "Failed to serialize message");
                self.dead_letter(message, e.to_string()).await;
                return Delivery::DeadLettered(id);
            }
        };

        let backend = self.backend().await;
        match backend.push(&message.recipient.queue_key(), json).await {
            Ok(_) => {
                info!(
                    "Message sent from {} to {}: {}",
                    message.sender, message.recipient, id
                );
                Delivery::Enqueued(id)
            }
            Err(e) => {
                error!(message_id = %id, error = %e, "Failed to publish message");
                self.observe(&e).await;
                self.dead_letter(message, e.to_string()).await;
                Delivery::DeadLettered(id)
            }
        }
    }

    async fn dead_letter(&self, message: QueueMessage, error: String) {
        let entry = DlqEntry::new(message, error);
        let id = entry.message.message_id.clone();
        let key = entry.message.recipient.dlq_key();

        let stored = match entry.to_json() {
            Ok(json) => {
                let backend = self.backend().await;
                match backend.push(&key, json).await {
                    Ok(_) => true,
                    Err(e) => {
                        error!(message_id = %id, error = %e, "Failed to store message in DLQ");
                        self.observe(&e).await;
                        false
                    }
                }
            }
            Err(e) => {
                error!(message_id = %id, error = %e, "Failed to serialize DLQ entry");
                false
            }
        };

        if !stored {
            self.spill.push(entry).await;
        }
        warn!(message_id = %id, "Message stored in DLQ");
    }

    /// Take the next message for `agent`, waiting up to the configured
    /// consume timeout.
    pub async fn consume(&self, agent: &AgentId) -> Option<QueueMessage> {
        self.consume_with_timeout(agent, self.config.consume_timeout)
            .await
    }

    /// Take the next message for `agent`, waiting up to `timeout`.
    ///
    /// Backend and decode errors are logged and yield `None`.
    pub async fn consume_with_timeout(
        &self,
        agent: &AgentId,
        timeout: Duration,
    ) -> Option<QueueMessage> {
        let backend = self.backend().await;
        match backend.blocking_pop(&agent.queue_key(), timeout).await {
            Ok(Some(raw)) => match QueueMessage::from_json(&raw) {
                Ok(message) => {
                    debug!("Message consumed by {}: {}", agent, message.message_id);
                    Some(message)
                }
                Err(e) => {
                    error!(agent = %agent, error = %e, "Dropping undecodable message");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                error!("Failed to consume message for {}: {}", agent, e);
                self.observe(&e).await;
                None
            }
        }
    }

    /// Drain up to `batch_size` messages without waiting
    pub async fn consume_batch(&self, agent: &AgentId, batch_size: usize) -> Vec<QueueMessage> {
        let backend = self.backend().await;
        let key = agent.queue_key();
        let mut messages = Vec::new();

        while messages.len() < batch_size {
            match backend.pop(&key).await {
                Ok(Some(raw)) => match QueueMessage::from_json(&raw) {
                    Ok(message) => messages.push(message),
                    Err(e) => {
                        error!(agent = %agent, error = %e, "Dropping undecodable message");
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to consume batch for {}: {}", agent, e);
                    self.observe(&e).await;
                    break;
                }
            }
        }

        if !messages.is_empty() {
            info!("Batch consumed {} messages for {}", messages.len(), agent);
        }
        messages
    }

    /// Discard every message waiting for `agent`. Messages are not moved to the DLQ.
    pub async fn clear_queue(&self, agent: &AgentId) -> QueueResult<()> {
        let backend = self.backend().await;
        match backend.delete(&agent.queue_key()).await {
            Ok(()) => {
                info!("Cleared queue for {}", agent);
                Ok(())
            }
            Err(e) => {
                error!("Failed to clear queue for {}: {}", agent, e);
                self.observe(&e).await;
                Err(e)
            }
        }
    }

    /// Number of messages waiting for `agent` (0 on backend error)
    pub async fn get_queue_size(&self, agent: &AgentId) -> usize {
        let backend = self.backend().await;
        match backend.length(&agent.queue_key()).await {
            Ok(len) => len,
            Err(e) => {
                error!("Failed to get queue size for {}: {}", agent, e);
                self.observe(&e).await;
                0
            }
        }
    }

    /// Number of dead letters recorded for `agent`
    pub async fn get_dlq_size(&self, agent: &AgentId) -> usize {
        let backend = self.backend().await;
        let stored = match backend.length(&agent.dlq_key()).await {
            Ok(len) => len,
            Err(e) => {
                error!("Failed to get DLQ size for {}: {}", agent, e);
                self.observe(&e).await;
                0
            }
        };
        stored + self.spill.len(agent).await
    }

    /// Every dead letter recorded for `agent`, oldest first
    pub async fn get_dlq_messages(&self, agent: &AgentId) -> Vec<DlqEntry> {
        let backend = self.backend().await;
        let mut entries = match backend.range(&agent.dlq_key()).await {
            Ok(raw) => raw
                .iter()
                .filter_map(|json| match DlqEntry::from_json(json) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!(agent = %agent, error = %e, "Skipping undecodable DLQ entry");
                        None
                    }
                })
                .collect(),
            Err(e) => {
                error!("Failed to get DLQ messages for {}: {}", agent, e);
                self.observe(&e).await;
                Vec::new()
            }
        };
        entries.extend(self.spill.list(agent).await);
        entries.sort_by_key(|entry| entry.timestamp);
        entries
    }

    /// Queue and DLQ sizes for every agent that has either.
    ///
    /// Computed fresh on each call by scanning `queue:*` keys.
    pub async fn get_all_queue_stats(&self) -> BTreeMap<AgentId, QueueStats> {
        let backend = self.backend().await;
        let keys = match backend.list_keys(QUEUE_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                error!("Failed to get queue stats: {}", e);
                self.observe(&e).await;
                Vec::new()
            }
        };

        let mut agents: Vec<AgentId> = keys
            .iter()
            .filter_map(|key| match key.strip_suffix(DLQ_SUFFIX) {
                Some(primary) => AgentId::from_queue_key(primary),
                None => AgentId::from_queue_key(key),
            })
            .collect();
        agents.extend(self.spill.agents().await);
        agents.sort();
        agents.dedup();

        let mut stats = BTreeMap::new();
        for agent in agents {
            let queue_size = self.get_queue_size(&agent).await;
            let dlq_size = self.get_dlq_size(&agent).await;
            stats.insert(
                agent,
                QueueStats {
                    queue_size,
                    dlq_size,
                    last_updated: Utc::now(),
                },
            );
        }
        stats
    }

    /// Probe the active backend
    pub async fn health_check(&self) -> BackendHealth {
        let backend = self.backend().await;
        match backend.ping().await {
            Ok(()) => BackendHealth::healthy(backend.name()),
            Err(e) => {
                let health = BackendHealth::unhealthy(backend.name(), e.to_string());
                self.observe(&e).await;
                health
            }
        }
    }

    /// Republish a message whose downstream processing failed.
    ///
    /// Waits `retry_delay * retry_count` first. Returns `false` without
    /// republishing once `max_retries` is reached; such messages are dropped.
    /// Also returns `false` when the republish itself was dead-lettered.
    pub async fn retry_message(&self, mut message: QueueMessage) -> bool {
        if message.retry_count >= self.config.max_retries {
            warn!(
                "Message {} exceeded max retries ({})",
                message.message_id, self.config.max_retries
            );
            return false;
        }

        message.retry_count += 1;
        tokio::time::sleep(self.config.retry_delay * message.retry_count).await;

        debug!(
            "Retrying message {} (attempt {})",
            message.message_id, message.retry_count
        );
        match self.enqueue(message).await {
            Delivery::Enqueued(_) => true,
            Delivery::DeadLettered(id) => {
                warn!(message_id = %id, "Retry could not be enqueued, message dead-lettered");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn agent(name: &str) -> AgentId {
        AgentId::parse(name).unwrap()
    }

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    fn fast_config() -> QueueConfig {
        QueueConfig {
            retry_delay: Duration::from_millis(10),
            consume_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    /// Backend whose pushes all fail; everything else behaves like memory
    struct RejectingBackend {
        inner: MemoryBackend,
        error: QueueError,
        pushes: AtomicUsize,
    }

    impl RejectingBackend {
        fn new(error: QueueError) -> Self {
            Self {
                inner: MemoryBackend::new(),
                error,
                pushes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl QueueBackend for RejectingBackend {
        fn name(&self) -> &'static str {
            "rejecting"
        }
        async fn push(&self, _key: &str, _value: String) -> QueueResult<usize> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        }
        async fn pop(&self, key: &str) -> QueueResult<Option<String>> {
            self.inner.pop(key).await
        }
        async fn blocking_pop(&self, key: &str, timeout: Duration) -> QueueResult<Option<String>> {
            self.inner.blocking_pop(key, timeout).await
        }
        async fn length(&self, key: &str) -> QueueResult<usize> {
            self.inner.length(key).await
        }
        async fn delete(&self, key: &str) -> QueueResult<()> {
            self.inner.delete(key).await
        }
        async fn list_keys(&self, prefix: &str) -> QueueResult<Vec<String>> {
            self.inner.list_keys(prefix).await
        }
        async fn range(&self, key: &str) -> QueueResult<Vec<String>> {
            self.inner.range(key).await
        }
        async fn ping(&self) -> QueueResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_then_consume() {
        let queue = MessageQueue::in_memory(fast_config());
        let delivery = queue
            .publish(&agent("watchtower"), &agent("auditor"), payload(json!({"x": 1})))
            .await;
        assert!(delivery.is_enqueued());

        let message = queue.consume(&agent("auditor")).await.unwrap();
        assert_eq!(message.payload, payload(json!({"x": 1})));
        assert_eq!(message.retry_count, 0);
        assert_eq!(&message.message_id, delivery.message_id());
        assert_eq!(message.sender, agent("watchtower"));
    }

    #[tokio::test]
    async fn test_consume_removes_message() {
        let queue = MessageQueue::in_memory(fast_config());
        queue
            .publish(&agent("a"), &agent("b"), payload(json!({"n": 1})))
            .await;

        assert!(queue.consume(&agent("b")).await.is_some());
        assert!(queue.consume(&agent("b")).await.is_none());
        assert_eq!(queue.get_queue_size(&agent("b")).await, 0);
    }

    #[tokio::test]
    async fn test_consume_skips_malformed_entry() {
        let backend = Arc::new(MemoryBackend::new());
        backend.push("queue:b", "{garbage".into()).await.unwrap();
        let queue = MessageQueue::new(backend, fast_config());

        assert!(queue.consume(&agent("b")).await.is_none());
        queue
            .publish(&agent("a"), &agent("b"), payload(json!({"ok": true})))
            .await;
        assert!(queue.consume(&agent("b")).await.is_some());
    }

    #[tokio::test]
    async fn test_consume_batch_respects_limit() {
        let queue = MessageQueue::in_memory(fast_config());
        for n in 0..5 {
            queue
                .publish(&agent("a"), &agent("b"), payload(json!({"n": n})))
                .await;
        }

        let first = queue.consume_batch(&agent("b"), 3).await;
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].payload["n"], 0);
        assert_eq!(first[2].payload["n"], 2);

        let rest = queue.consume_batch(&agent("b"), 10).await;
        assert_eq!(rest.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_queue_discards_without_dlq() {
        let queue = MessageQueue::in_memory(fast_config());
        queue.publish(&agent("a"), &agent("b"), Payload::new()).await;
        queue.clear_queue(&agent("b")).await.unwrap();

        assert_eq!(queue.get_queue_size(&agent("b")).await, 0);
        assert_eq!(queue.get_dlq_size(&agent("b")).await, 0);
    }

    #[tokio::test]
    async fn test_rejected_push_goes_to_dlq_exactly_once() {
        let backend = Arc::new(RejectingBackend::new(QueueError::Backend("READONLY".into())));
        let queue = MessageQueue::new(backend.clone(), fast_config());

        let delivery = queue
            .publish(&agent("watchtower"), &agent("auditor"), payload(json!({"x": 1})))
            .await;
        assert!(!delivery.is_enqueued());

        let entries = queue.get_dlq_messages(&agent("auditor")).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message.payload, payload(json!({"x": 1})));
        assert!(!entries[0].error.is_empty());
        assert_eq!(queue.get_dlq_size(&agent("auditor")).await, 1);
        assert!(!queue.is_degraded());
    }

    #[tokio::test]
    async fn test_unreachable_backend_degrades_mid_operation() {
        let backend = Arc::new(RejectingBackend::new(QueueError::Unavailable(
            "connection reset".into(),
        )));
        let queue = MessageQueue::new(backend, fast_config());

        queue
            .publish(&agent("a"), &agent("b"), payload(json!({"first": 1})))
            .await;
        assert!(queue.is_degraded());
        assert_eq!(queue.backend_name().await, "memory");
        assert_eq!(queue.get_dlq_messages(&agent("b")).await.len(), 1);

        // Later traffic flows through the in-memory backend.
        queue
            .publish(&agent("a"), &agent("b"), payload(json!({"second": 2})))
            .await;
        let message = queue.consume(&agent("b")).await.unwrap();
        assert_eq!(message.payload, payload(json!({"second": 2})));
    }

    #[tokio::test]
    async fn test_connect_failure_falls_back() {
        let queue = MessageQueue::connect_with(
            async { Err(QueueError::Unavailable("refused".into())) },
            fast_config(),
        )
        .await;
        assert!(queue.is_degraded());
        assert!(queue.health_check().await.is_healthy());
    }

    #[tokio::test]
    async fn test_stats_exclude_dlq_from_primary_count() {
        let backend = Arc::new(MemoryBackend::new());
        let queue = MessageQueue::new(backend.clone(), fast_config());

        queue.publish(&agent("a"), &agent("auditor"), Payload::new()).await;
        queue.publish(&agent("a"), &agent("auditor"), Payload::new()).await;
        let entry = DlqEntry::new(
            QueueMessage::new(agent("a"), agent("treasurer"), Payload::new()),
            "boom",
        );
        backend
            .push("queue:treasurer:dlq", entry.to_json().unwrap())
            .await
            .unwrap();

        let stats = queue.get_all_queue_stats().await;
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[&agent("auditor")].queue_size, 2);
        assert_eq!(stats[&agent("auditor")].dlq_size, 0);
        assert_eq!(stats[&agent("treasurer")].queue_size, 0);
        assert_eq!(stats[&agent("treasurer")].dlq_size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_increments_and_republishes() {
        let queue = MessageQueue::in_memory(QueueConfig::default());
        let message = QueueMessage::new(agent("a"), agent("b"), payload(json!({"job": 7})));
        let id = message.message_id.clone();

        let start = tokio::time::Instant::now();
        assert!(queue.retry_message(message).await);
        // Linear backoff: first retry waits 1 * retry_delay.
        assert!(start.elapsed() >= Duration::from_secs(5));

        let republished = queue.consume(&agent("b")).await.unwrap();
        assert_eq!(republished.retry_count, 1);
        assert_eq!(republished.message_id, id);
        assert_eq!(republished.payload, payload(json!({"job": 7})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_drops_message() {
        let queue = MessageQueue::in_memory(QueueConfig::default());
        let mut message = QueueMessage::new(agent("a"), agent("b"), Payload::new());

        for expected in 1..=3 {
            assert!(queue.retry_message(message.clone()).await);
            message = queue.consume(&agent("b")).await.unwrap();
            assert_eq!(message.retry_count, expected);
        }

        assert!(!queue.retry_message(message).await);
        assert_eq!(queue.get_queue_size(&agent("b")).await, 0);
        assert_eq!(queue.get_dlq_size(&agent("b")).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_lettered_retry_reports_failure() {
        let backend = Arc::new(RejectingBackend::new(QueueError::Backend("READONLY".into())));
        let queue = MessageQueue::new(backend, fast_config());
        let message = QueueMessage::new(agent("a"), agent("b"), payload(json!({"job": 1})));

        assert!(!queue.retry_message(message).await);
        let entries = queue.get_dlq_messages(&agent("b")).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message.retry_count, 1);
    }
}
