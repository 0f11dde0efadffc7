//! Redis-backed operational store.
//!
//! Provides connection pooling via `ConnectionManager`, automatic
//! reconnection, and bounded retry for transient failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use tokio::sync::RwLock;

use super::scripts::{AtomicScript, TIME_BUDGET};
use super::{OperationalStore, StoreError};

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum retry attempts for operations
    pub max_retries: u32,
    /// Retry delay in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            timeout_ms: 5000,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

/// Redis client wrapper with connection management
pub struct RedisStore {
    config: RedisConfig,
    connection: Arc<RwLock<Option<ConnectionManager>>>,
    client: Client,
}

impl RedisStore {
    /// Create a new Redis store
    pub async fn new(config: RedisConfig) -> Result<Self, RedisError> {
        let client = Client::open(config.url.as_str())?;

        let store = Self {
            config,
            connection: Arc::new(RwLock::new(None)),
            client,
        };

        // Try to establish initial connection
        store.ensure_connected().await?;

        Ok(store)
    }

    /// Create from URL string
    pub async fn from_url(url: &str) -> Result<Self, RedisError> {
        Self::new(RedisConfig {
            url: url.to_string(),
            ..Default::default()
        })
        .await
    }

    /// Get connection info
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Ensure connection is established
    async fn ensure_connected(&self) -> Result<(), RedisError> {
        let mut conn = self.connection.write().await;
        if conn.is_none() {
            tracing::info!("Establishing Redis connection to {}", self.config.url);
            let manager = ConnectionManager::new(self.client.clone()).await?;
            *conn = Some(manager);
            tracing::info!("Redis connection established");
        }
        Ok(())
    }

    /// Get connection manager, reconnecting if necessary
    async fn get_connection(&self) -> Result<ConnectionManager, RedisError> {
        self.ensure_connected().await?;
        let conn = self.connection.read().await;
        conn.clone()
            .ok_or_else(|| RedisError::from((redis::ErrorKind::IoError, "Connection not available")))
    }

    /// Execute operation with retry logic
    async fn with_retry<F, Fut, T>(&self, mut operation: F) -> Result<T, RedisError>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.config.max_retries {
            match self.get_connection().await {
                Ok(conn) => match operation(conn).await {
                    Ok(result) => return Ok(result),
                    Err(e) => {
                        tracing::warn!(
                            "Redis operation failed (attempt {}/{}): {}",
                            attempt + 1,
                            self.config.max_retries,
                            e
                        );
                        last_error = Some(e);

                        // Clear connection on error to force reconnect
                        if attempt < self.config.max_retries - 1 {
                            let mut conn = self.connection.write().await;
                            *conn = None;
                            tokio::time::sleep(Duration::from_millis(
                                self.config.retry_delay_ms * (attempt as u64 + 1),
                            ))
                            .await;
                        }
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        "Redis connection failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.config.max_retries,
                        e
                    );
                    last_error = Some(e);

                    if attempt < self.config.max_retries - 1 {
                        tokio::time::sleep(Duration::from_millis(
                            self.config.retry_delay_ms * (attempt as u64 + 1),
                        ))
                        .await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| RedisError::from((redis::ErrorKind::IoError, "Max retries exceeded"))))
    }
}

#[async_trait]
impl OperationalStore for RedisStore {
    async fn ping(&self) -> Result<Duration, StoreError> {
        let started = Instant::now();
        let pong: String = self
            .with_retry(|mut conn| async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        if pong == "PONG" {
            Ok(started.elapsed())
        } else {
            Err(StoreError::Unavailable(format!("unexpected PING reply: {}", pong)))
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let key = key.to_string();
                async move { conn.get(&key).await }
            })
            .await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let key = key.to_string();
                let value = value.to_string();
                async move { conn.set(&key, value).await }
            })
            .await?)
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let key = key.to_string();
                async move {
                    let count: i32 = conn.del(&key).await?;
                    Ok(count > 0)
                }
            })
            .await?)
    }

    async fn hset_multiple(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<(), StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let key = key.to_string();
                let fields = fields.to_vec();
                async move { conn.hset_multiple(&key, &fields).await }
            })
            .await?)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let key = key.to_string();
                let field = field.to_string();
                async move { conn.hget(&key, &field).await }
            })
            .await?)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let key = key.to_string();
                async move { conn.hgetall(&key).await }
            })
            .await?)
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let key = key.to_string();
                let field = field.to_string();
                async move { conn.hincr(&key, &field, delta).await }
            })
            .await?)
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let key = key.to_string();
                let member = member.to_string();
                async move {
                    let count: i32 = conn.zadd(&key, member, score).await?;
                    Ok(count > 0)
                }
            })
            .await?)
    }

    async fn zrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        ascending: bool,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let key = key.to_string();
                async move {
                    if ascending {
                        conn.zrange(&key, start, stop).await
                    } else {
                        conn.zrevrange(&key, start, stop).await
                    }
                }
            })
            .await?)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let key = key.to_string();
                let member = member.to_string();
                async move {
                    let count: i32 = conn.zrem(&key, member).await?;
                    Ok(count > 0)
                }
            })
            .await?)
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<i64, StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let key = key.to_string();
                let value = value.to_string();
                async move { conn.lpush(&key, value).await }
            })
            .await?)
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let key = key.to_string();
                async move { conn.rpop(&key, None).await }
            })
            .await?)
    }

    async fn llen(&self, key: &str) -> Result<i64, StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let key = key.to_string();
                async move { conn.llen(&key).await }
            })
            .await?)
    }

    async fn rpoplpush(&self, src: &str, dst: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let src = src.to_string();
                let dst = dst.to_string();
                async move { conn.rpoplpush(&src, &dst).await }
            })
            .await?)
    }

    async fn lrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let key = key.to_string();
                async move { conn.lrange(&key, start, stop).await }
            })
            .await?)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        Ok(self
            .with_retry(|mut conn| {
                let key = key.to_string();
                async move { conn.incr(&key, 1i64).await }
            })
            .await?)
    }

    async fn eval_script(
        &self,
        script: &AtomicScript,
        keys: &[String],
        args: &[i64],
    ) -> Result<i64, StoreError> {
        let evaluation = self.with_retry(|mut conn| {
            let keys = keys.to_vec();
            let args = args.to_vec();
            let source = script.source;
            async move {
                let script = redis::Script::new(source);
                let mut prepared = script.prepare_invoke();
                for key in &keys {
                    prepared.key(key);
                }
                for arg in &args {
                    prepared.arg(*arg);
                }
                prepared.invoke_async(&mut conn).await
            }
        });

        match tokio::time::timeout(TIME_BUDGET, evaluation).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::ScriptTimeout {
                script: script.name,
                budget_ms: TIME_BUDGET.as_millis() as u64,
            }),
        }
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), StoreError> {
        self.with_retry(|mut conn| {
            let channel = channel.to_string();
            let message = message.to_string();
            async move {
                let _: i32 = conn.publish(&channel, message).await?;
                Ok(())
            }
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_default() {
        let config = RedisConfig::default();
        assert_eq!(config.url, "redis://127.0.0.1:6379");
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.max_retries, 3);
    }
}
