//! In-process backend used when no broker is reachable.
//!
//! Same contract as the Redis backend, minus durability and cross-process
//! visibility.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::QueueBackend;
use crate::error::QueueResult;

/// In-memory list store
#[derive(Debug, Default)]
pub struct MemoryBackend {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    pushed: Notify,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn push(&self, key: &str, value: String) -> QueueResult<usize> {
        let len = {
            let mut lists = self.lists.lock().await;
            let list = lists.entry(key.to_string()).or_default();
            list.push_front(value);
            list.len()
        };
        self.pushed.notify_waiters();
        Ok(len)
    }

    async fn pop(&self, key: &str) -> QueueResult<Option<String>> {
        let mut lists = self.lists.lock().await;
        let Some(list) = lists.get_mut(key) else {
            return Ok(None);
        };
        let value = list.pop_back();
        // Redis drops empty lists; mirror that so list_keys agrees.
        if list.is_empty() {
            lists.remove(key);
        }
        Ok(value)
    }

    async fn blocking_pop(&self, key: &str, timeout: Duration) -> QueueResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking so a push in between is not missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.pop(key).await? {
                return Ok(Some(value));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn length(&self, key: &str) -> QueueResult<usize> {
        Ok(self.lists.lock().await.get(key).map_or(0, VecDeque::len))
    }

    async fn delete(&self, key: &str) -> QueueResult<()> {
        self.lists.lock().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> QueueResult<Vec<String>> {
        let lists = self.lists.lock().await;
        let mut keys: Vec<String> = lists
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn range(&self, key: &str) -> QueueResult<Vec<String>> {
        let lists = self.lists.lock().await;
        Ok(lists
            .get(key)
            .map(|list| list.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_push_pop_is_fifo() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.push("queue:a", "1".into()).await.unwrap(), 1);
        assert_eq!(backend.push("queue:a", "2".into()).await.unwrap(), 2);

        assert_eq!(backend.pop("queue:a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(backend.pop("queue:a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(backend.pop("queue:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_list_disappears() {
        let backend = MemoryBackend::new();
        backend.push("queue:a", "1".into()).await.unwrap();
        backend.pop("queue:a").await.unwrap();
        assert!(backend.list_keys("queue:").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_length_delete_and_keys() {
        let backend = MemoryBackend::new();
        backend.push("queue:a", "1".into()).await.unwrap();
        backend.push("queue:a:dlq", "x".into()).await.unwrap();
        backend.push("other", "y".into()).await.unwrap();

        assert_eq!(backend.length("queue:a").await.unwrap(), 1);
        assert_eq!(backend.length("missing").await.unwrap(), 0);
        assert_eq!(
            backend.list_keys("queue:").await.unwrap(),
            vec!["queue:a".to_string(), "queue:a:dlq".to_string()]
        );

        backend.delete("queue:a").await.unwrap();
        assert_eq!(backend.length("queue:a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_range_is_oldest_first_and_non_destructive() {
        let backend = MemoryBackend::new();
        for v in ["1", "2", "3"] {
            backend.push("k", v.into()).await.unwrap();
        }
        assert_eq!(backend.range("k").await.unwrap(), vec!["1", "2", "3"]);
        assert_eq!(backend.length("k").await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_pop_times_out() {
        let backend = MemoryBackend::new();
        let start = Instant::now();
        let value = backend
            .blocking_pop("queue:a", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(value, None);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_does_not_wait() {
        let backend = MemoryBackend::new();
        let start = Instant::now();
        assert_eq!(backend.blocking_pop("queue:a", Duration::ZERO).await.unwrap(), None);
        assert_eq!(start.elapsed(), Duration::ZERO);

        backend.push("queue:a", "1".into()).await.unwrap();
        assert_eq!(
            backend
                .blocking_pop("queue:a", Duration::ZERO)
                .await
                .unwrap()
                .as_deref(),
            Some("1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_pop_wakes_on_push() {
        let backend = Arc::new(MemoryBackend::new());
        let waiter = {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move {
                backend
                    .blocking_pop("queue:a", Duration::from_secs(30))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        backend.push("queue:a", "late".into()).await.unwrap();

        let value = waiter.await.unwrap().unwrap();
        assert_eq!(value.as_deref(), Some("late"));
    }
}
