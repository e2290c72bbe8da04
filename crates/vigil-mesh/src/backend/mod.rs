//! Queue backend abstraction.
//!
//! A backend is a key → ordered list store. Values are pushed at the head and
//! popped from the tail, so each list is first-in-first-out. Every operation
//! is a single atomic step on the backend; callers never lock around them.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::QueueResult;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryBackend;
#[cfg(feature = "redis")]
pub use redis::{RedisBackend, RedisConfig};

/// Ordered-list storage used by the message queue service
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Short name for logs and health reports
    fn name(&self) -> &'static str;

    /// Append `value` at the insertion end of `key`, returning the new length
    async fn push(&self, key: &str, value: String) -> QueueResult<usize>;

    /// Remove and return the oldest element of `key`, without waiting
    async fn pop(&self, key: &str) -> QueueResult<Option<String>>;

    /// Like [`pop`](Self::pop), but wait up to `timeout` for an element.
    /// A zero `timeout` does not wait at all.
    async fn blocking_pop(&self, key: &str, timeout: Duration) -> QueueResult<Option<String>>;

    /// Number of elements stored under `key` (0 if absent)
    async fn length(&self, key: &str) -> QueueResult<usize>;

    /// Drop `key` and everything stored under it
    async fn delete(&self, key: &str) -> QueueResult<()>;

    /// Every existing key starting with `prefix`
    async fn list_keys(&self, prefix: &str) -> QueueResult<Vec<String>>;

    /// Every element of `key`, oldest first, without removing anything
    async fn range(&self, key: &str) -> QueueResult<Vec<String>>;

    /// Liveness probe
    async fn ping(&self) -> QueueResult<()>;

    /// Release connections held by the backend
    async fn close(&self) {}
}
