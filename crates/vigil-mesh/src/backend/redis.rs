//! Redis-based implementation of [`QueueBackend`]

use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

use super::QueueBackend;
use crate::error::{QueueError, QueueResult};

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Maximum number of connections in the pool
    pub pool_size: usize,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            connect_timeout_secs: 5,
        }
    }
}

impl RedisConfig {
    /// Create a new Redis configuration
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the pool size
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }
}

/// List-based queue storage on a Redis server
pub struct RedisBackend {
    pool: deadpool_redis::Pool,
    config: RedisConfig,
}

impl RedisBackend {
    /// Connect with default pool settings
    pub async fn new(url: impl Into<String>) -> QueueResult<Self> {
        Self::with_config(RedisConfig::new(url)).await
    }

    /// Connect and verify the server answers `PING`
    pub async fn with_config(config: RedisConfig) -> QueueResult<Self> {
        let pool = deadpool_redis::Config::from_url(&config.url)
            .builder()
            .map_err(|e| QueueError::InvalidConfig(e.to_string()))?
            .max_size(config.pool_size)
            .runtime(deadpool_redis::Runtime::Tokio1)
            .build()
            .map_err(|e| QueueError::InvalidConfig(e.to_string()))?;

        let backend = Self { pool, config };

        let timeout = Duration::from_secs(backend.config.connect_timeout_secs);
        tokio::time::timeout(timeout, backend.ping())
            .await
            .map_err(|_| {
                QueueError::Unavailable(format!(
                    "no answer from {} within {:?}",
                    backend.config.url, timeout
                ))
            })??;

        debug!("Redis backend connected to {}", backend.config.url);
        Ok(backend)
    }

    /// Get a connection from the pool
    async fn get_connection(&self) -> QueueResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl QueueBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn push(&self, key: &str, value: String) -> QueueResult<usize> {
        let mut conn = self.get_connection().await?;
        let len: usize = conn.lpush(key, value).await?;
        Ok(len)
    }

    async fn pop(&self, key: &str) -> QueueResult<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.rpop(key, None).await?;
        Ok(value)
    }

    async fn blocking_pop(&self, key: &str, timeout: Duration) -> QueueResult<Option<String>> {
        // BRPOP treats 0 as "wait forever"
        if timeout.is_zero() {
            return self.pop(key).await;
        }
        let mut conn = self.get_connection().await?;

        // BRPOP: blocking right pop with timeout
        let result: Option<(String, String)> = conn.brpop(key, timeout.as_secs_f64()).await?;
        Ok(result.map(|(_key, value)| value))
    }

    async fn length(&self, key: &str) -> QueueResult<usize> {
        let mut conn = self.get_connection().await?;
        let len: usize = conn.llen(key).await?;
        Ok(len)
    }

    async fn delete(&self, key: &str) -> QueueResult<()> {
        let mut conn = self.get_connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> QueueResult<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{prefix}*"))
            .query_async(&mut conn)
            .await?;
        Ok(keys)
    }

    async fn range(&self, key: &str) -> QueueResult<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let mut values: Vec<String> = conn.lrange(key, 0, -1).await?;
        // LPUSH puts the newest element at index 0.
        values.reverse();
        Ok(values)
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.get_connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::from)?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
        debug!("Redis backend pool closed");
    }
}
