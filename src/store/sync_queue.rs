//! Change queues.
//!
//! Append-only per-entity queues of mutation records. The drain side uses
//! the two-queue handoff (`main -> processing -> commit -> drop processing`)
//! so a crash between commit and cleanup replays the batch instead of
//! losing it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{keys, OperationalStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Orders,
    Trades,
    Assets,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Orders, EntityKind::Trades, EntityKind::Assets];
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Orders => write!(f, "orders"),
            EntityKind::Trades => write!(f, "trades"),
            EntityKind::Assets => write!(f, "assets"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

/// Queue payload. The authoritative entity state is re-read from its hash
/// at drain time, so repeated records for one id collapse naturally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub entity_id: String,
    pub operation: ChangeOp,
    pub timestamp: i64,
}

impl ChangeRecord {
    pub fn new(entity_id: impl Into<String>, operation: ChangeOp, timestamp: i64) -> Self {
        Self {
            entity_id: entity_id.into(),
            operation,
            timestamp,
        }
    }
}

pub struct SyncQueue<S> {
    store: Arc<S>,
}

impl<S> Clone for SyncQueue<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: OperationalStore> SyncQueue<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn enqueue(&self, kind: EntityKind, record: &ChangeRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record).map_err(|e| StoreError::Corrupt {
            key: keys::sync_queue(kind),
            detail: e.to_string(),
        })?;
        self.store.lpush(&keys::sync_queue(kind), &payload).await?;
        Ok(())
    }

    pub async fn depth(&self, kind: EntityKind) -> Result<i64, StoreError> {
        self.store.llen(&keys::sync_queue(kind)).await
    }

    pub async fn processing_depth(&self, kind: EntityKind) -> Result<i64, StoreError> {
        self.store.llen(&keys::sync_queue_processing(kind)).await
    }

    /// Atomically move up to `max` items from the main queue tail into the
    /// processing queue. Returns the moved payloads in move order.
    pub async fn transfer_to_processing(
        &self,
        kind: EntityKind,
        max: usize,
    ) -> Result<Vec<String>, StoreError> {
        let main = keys::sync_queue(kind);
        let processing = keys::sync_queue_processing(kind);
        let mut moved = Vec::new();
        while moved.len() < max {
            match self.store.rpoplpush(&main, &processing).await? {
                Some(item) => moved.push(item),
                None => break,
            }
        }
        Ok(moved)
    }

    /// Everything currently sitting in the processing queue (crash
    /// recovery path).
    pub async fn processing_items(&self, kind: EntityKind) -> Result<Vec<String>, StoreError> {
        self.store
            .lrange(&keys::sync_queue_processing(kind), 0, -1)
            .await
    }

    /// Drop the processing queue after a successful commit.
    pub async fn clear_processing(&self, kind: EntityKind) -> Result<(), StoreError> {
        self.store.del(&keys::sync_queue_processing(kind)).await?;
        Ok(())
    }

    /// Move processing queue contents back to the head of the main queue
    /// so the next cycle retries them.
    pub async fn requeue_processing(&self, kind: EntityKind) -> Result<(), StoreError> {
        let main = keys::sync_queue(kind);
        let processing = keys::sync_queue_processing(kind);
        while self.store.rpoplpush(&processing, &main).await?.is_some() {}
        Ok(())
    }

    pub fn parse(kind: EntityKind, payload: &str) -> Result<ChangeRecord, StoreError> {
        serde_json::from_str(payload).map_err(|e| StoreError::Corrupt {
            key: keys::sync_queue(kind),
            detail: format!("bad change record `{}`: {}", payload, e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_payload_shape() {
        let record = ChangeRecord::new("42", ChangeOp::Update, 1_700_000_000_000);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"entityId":"42","operation":"update","timestamp":1700000000000}"#
        );
    }

    #[tokio::test]
    async fn test_handoff_and_requeue() {
        let store = Arc::new(MemoryStore::new());
        let queue = SyncQueue::new(store);

        for id in 0..5 {
            queue
                .enqueue(
                    EntityKind::Orders,
                    &ChangeRecord::new(id.to_string(), ChangeOp::Create, id),
                )
                .await
                .unwrap();
        }
        assert_eq!(queue.depth(EntityKind::Orders).await.unwrap(), 5);

        let moved = queue
            .transfer_to_processing(EntityKind::Orders, 3)
            .await
            .unwrap();
        assert_eq!(moved.len(), 3);
        assert_eq!(queue.depth(EntityKind::Orders).await.unwrap(), 2);
        assert_eq!(queue.processing_depth(EntityKind::Orders).await.unwrap(), 3);

        // Failure path: batch goes back to the main queue.
        queue.requeue_processing(EntityKind::Orders).await.unwrap();
        assert_eq!(queue.depth(EntityKind::Orders).await.unwrap(), 5);
        assert_eq!(queue.processing_depth(EntityKind::Orders).await.unwrap(), 0);

        // Success path: batch is dropped after commit.
        queue
            .transfer_to_processing(EntityKind::Orders, 5)
            .await
            .unwrap();
        queue.clear_processing(EntityKind::Orders).await.unwrap();
        assert_eq!(queue.depth(EntityKind::Orders).await.unwrap(), 0);
        assert_eq!(queue.processing_depth(EntityKind::Orders).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_oldest_moves_first() {
        let store = Arc::new(MemoryStore::new());
        let queue = SyncQueue::new(store);

        queue
            .enqueue(
                EntityKind::Trades,
                &ChangeRecord::new("first", ChangeOp::Create, 1),
            )
            .await
            .unwrap();
        queue
            .enqueue(
                EntityKind::Trades,
                &ChangeRecord::new("second", ChangeOp::Create, 2),
            )
            .await
            .unwrap();

        let moved = queue
            .transfer_to_processing(EntityKind::Trades, 1)
            .await
            .unwrap();
        let record = SyncQueue::<MemoryStore>::parse(EntityKind::Trades, &moved[0]).unwrap();
        assert_eq!(record.entity_id, "first");
    }
}
