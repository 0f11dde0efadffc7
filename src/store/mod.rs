//! Operational store.
//!
//! Typed wrapper over the key/value server that owns all hot-path state:
//! order hashes, asset balances, the active-book index, the trade log and
//! the change queues. The production implementation is Redis; an in-memory
//! implementation backs the test suite with the same atomicity contract.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

pub mod assets;
pub mod keys;
pub mod memory;
pub mod orders;
pub mod redis_client;
pub mod scripts;
pub mod sync_queue;
pub mod trades;

pub use assets::AssetStore;
pub use memory::MemoryStore;
pub use orders::OrderStore;
pub use redis_client::{RedisConfig, RedisStore};
pub use scripts::AtomicScript;
pub use sync_queue::{ChangeOp, ChangeRecord, EntityKind, SyncQueue};
pub use trades::TradeStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("script {script} exceeded its {budget_ms} ms budget")]
    ScriptTimeout { script: &'static str, budget_ms: u64 },

    #[error("malformed value at {key}: {detail}")]
    Corrupt { key: String, detail: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// The five-container contract of the operational store. All operations are
/// blocking from the caller's view; implementations may pool connections.
#[async_trait]
pub trait OperationalStore: Send + Sync + 'static {
    /// Round-trip health probe returning observed latency.
    async fn ping(&self) -> Result<Duration, StoreError>;

    // ==================== Plain keys (markers) ====================

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    // ==================== Hash ====================

    async fn hset_multiple(&self, key: &str, fields: &[(String, String)])
        -> Result<(), StoreError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;
    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError>;

    // ==================== Sorted set ====================

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<bool, StoreError>;
    async fn zrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        ascending: bool,
    ) -> Result<Vec<String>, StoreError>;
    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    // ==================== List ====================

    async fn lpush(&self, key: &str, value: &str) -> Result<i64, StoreError>;
    async fn rpop(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn llen(&self, key: &str) -> Result<i64, StoreError>;
    async fn rpoplpush(&self, src: &str, dst: &str) -> Result<Option<String>, StoreError>;
    async fn lrange(&self, key: &str, start: isize, stop: isize)
        -> Result<Vec<String>, StoreError>;

    // ==================== Counter ====================

    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    // ==================== Scripted block ====================

    /// Evaluate a server-side script atomically. Settlement calls are
    /// wrapped with [`scripts::TIME_BUDGET`]; exceeding it is a failure.
    async fn eval_script(
        &self,
        script: &AtomicScript,
        keys: &[String],
        args: &[i64],
    ) -> Result<i64, StoreError>;

    // ==================== Pub/Sub ====================

    async fn publish(&self, channel: &str, message: &str) -> Result<(), StoreError>;
}
