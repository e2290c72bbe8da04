//! # Vigil Mesh
//!
//! Point-to-point message queues for Vigil agents.
//!
//! Every agent has one inbound FIFO queue keyed `queue:{agent}` and a dead
//! letter queue keyed `queue:{agent}:dlq`. Queues live in Redis when a server
//! is reachable and in process memory otherwise; callers see the same
//! behaviour either way.
//!
//! ## Features
//!
//! - **Never-failing publish**: a message that cannot be enqueued is recorded
//!   in the recipient's dead letter queue instead
//! - **Transparent fallback**: an unreachable broker is replaced by an
//!   in-memory backend, at connect time or mid-operation
//! - **Linear retry**: [`MessageQueue::retry_message`] republishes with a
//!   growing delay up to a retry cap
//! - **Introspection**: per-agent queue and DLQ sizes, backend health
//!
//! ## Example
//!
//! ```rust,no_run
//! use vigil_mesh::{AgentId, MessageQueue, QueueConfig, RedisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let queue = MessageQueue::connect(
//!         RedisConfig::new("redis://localhost:6379"),
//!         QueueConfig::default(),
//!     )
//!     .await;
//!
//!     let watchtower = AgentId::parse("watchtower")?;
//!     let auditor = AgentId::parse("auditor")?;
//!
//!     let mut payload = vigil_mesh::Payload::new();
//!     payload.insert("disaster_event".into(), serde_json::json!({"id": "evt-1"}));
//!     queue.publish(&watchtower, &auditor, payload).await;
//!
//!     if let Some(message) = queue.consume(&auditor).await {
//!         println!("{} sent {:?}", message.sender, message.payload);
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod dlq;
pub mod error;
pub mod health;
pub mod message;
pub mod queue;
pub mod types;

pub use backend::{MemoryBackend, QueueBackend};
pub use dlq::{DeadLetterSpill, DlqEntry};
pub use error::{QueueError, QueueResult};
pub use health::{BackendHealth, HealthStatus};
pub use message::{MessageId, Payload, QueueMessage};
pub use queue::{Delivery, MessageQueue, QueueConfig, QueueStats};
pub use types::{AgentId, DLQ_SUFFIX, IdValidationError, QUEUE_PREFIX};

#[cfg(feature = "redis")]
pub use backend::{RedisBackend, RedisConfig};
