//! Durable synchroniser workers.
//!
//! One worker per entity kind. Each cycle moves up to `batch_size` change
//! records from the main queue into the processing queue (tail-to-head
//! transfer), resolves current entity state from the store, applies the
//! batch to the relational sink in one transaction, and only then drops
//! the processing queue. Any failure before commit pushes the batch back
//! to the head of the main queue; a crash after commit leaves the
//! processing queue behind, and `recover` re-applies it on restart. The
//! sink's idempotence makes the replay safe.

use std::sync::Arc;
use std::time::Duration;

use crate::store::{
    AssetStore, EntityKind, OperationalStore, OrderStore, StoreError, SyncQueue, TradeStore,
};

use super::{ChangeApply, DurableSink, EntityState};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Sleep between drain cycles when the queue is shallow.
    pub interval: Duration,
    /// Hard cap per transaction; never expanded under pressure.
    pub batch_size: usize,
    /// Depth at which the worker stops sleeping between cycles.
    pub watermark: i64,
    /// Base delay after a failed cycle.
    pub backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            batch_size: 500,
            watermark: 1_000,
            backoff: Duration::from_secs(1),
        }
    }
}

pub struct SyncWorker<S, D> {
    kind: EntityKind,
    queue: SyncQueue<S>,
    orders: OrderStore<S>,
    trades: TradeStore<S>,
    assets: AssetStore<S>,
    sink: Arc<D>,
    config: SyncConfig,
}

impl<S: OperationalStore, D: DurableSink> SyncWorker<S, D> {
    pub fn new(kind: EntityKind, store: Arc<S>, sink: Arc<D>, config: SyncConfig) -> Self {
        Self {
            kind,
            queue: SyncQueue::new(Arc::clone(&store)),
            orders: OrderStore::new(Arc::clone(&store)),
            trades: TradeStore::new(Arc::clone(&store)),
            assets: AssetStore::new(store),
            sink,
            config,
        }
    }

    /// Re-apply a processing queue left behind by a crash between commit
    /// and cleanup. Returns the number of replayed records.
    pub async fn recover(&self) -> anyhow::Result<usize> {
        let leftovers = self.queue.processing_items(self.kind).await?;
        if leftovers.is_empty() {
            return Ok(0);
        }
        tracing::warn!(
            kind = %self.kind,
            count = leftovers.len(),
            "replaying processing queue left by a previous run"
        );
        let batch = self.resolve(&leftovers).await?;
        self.sink.apply(self.kind, &batch).await?;
        self.queue.clear_processing(self.kind).await?;
        crate::metrics::record_sync_batch(&self.kind.to_string(), "replayed", batch.len());
        Ok(batch.len())
    }

    /// One drain cycle. Returns the number of records committed.
    pub async fn drain_once(&self) -> anyhow::Result<usize> {
        let payloads = self
            .queue
            .transfer_to_processing(self.kind, self.config.batch_size)
            .await?;
        if payloads.is_empty() {
            return Ok(0);
        }

        let batch = match self.resolve(&payloads).await {
            Ok(batch) => batch,
            Err(e) => {
                self.queue.requeue_processing(self.kind).await?;
                return Err(e.into());
            }
        };

        match self.sink.apply(self.kind, &batch).await {
            Ok(()) => {
                self.queue.clear_processing(self.kind).await?;
                crate::metrics::record_sync_batch(&self.kind.to_string(), "ok", batch.len());
                Ok(batch.len())
            }
            Err(e) => {
                self.queue.requeue_processing(self.kind).await?;
                crate::metrics::record_sync_batch(&self.kind.to_string(), "failed", batch.len());
                Err(e)
            }
        }
    }

    /// Parse payloads and read the authoritative entity state from the
    /// store. Unparseable records are logged and skipped so one poison
    /// payload cannot wedge the queue forever.
    async fn resolve(&self, payloads: &[String]) -> Result<Vec<ChangeApply>, StoreError> {
        let mut batch = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let record = match SyncQueue::<S>::parse(self.kind, payload) {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(kind = %self.kind, error = %e, "dropping poison change record");
                    continue;
                }
            };
            let state = match self.kind {
                EntityKind::Orders => {
                    let id = record.entity_id.parse::<i64>().unwrap_or(-1);
                    self.orders.load(id).await?.map(EntityState::Order)
                }
                EntityKind::Trades => {
                    let id = record.entity_id.parse::<i64>().unwrap_or(-1);
                    self.trades.load(id).await?.map(EntityState::Trade)
                }
                EntityKind::Assets => match record.entity_id.split_once(':') {
                    Some((user, currency)) => {
                        let user_id = user.parse::<i64>().unwrap_or(-1);
                        Some(EntityState::Asset(
                            self.assets.load(user_id, currency).await?,
                        ))
                    }
                    None => None,
                },
            };
            batch.push(ChangeApply { record, state });
        }
        Ok(batch)
    }

    /// Worker loop: timer-driven, skipping the sleep while the queue is
    /// above the watermark, retrying indefinitely with back-off.
    pub async fn run(self) {
        if let Err(e) = self.recover().await {
            tracing::error!(kind = %self.kind, error = %e, "processing-queue replay failed");
        }
        tracing::info!(kind = %self.kind, "sync worker started");

        loop {
            match self.drain_once().await {
                Ok(committed) => {
                    let depth = self.queue.depth(self.kind).await.unwrap_or(0);
                    crate::metrics::set_sync_queue_depth(&self.kind.to_string(), depth);
                    if committed > 0 {
                        tracing::debug!(kind = %self.kind, committed, depth, "batch committed");
                    }
                    if depth < self.config.watermark {
                        tokio::time::sleep(self.config.interval).await;
                    }
                }
                Err(e) => {
                    tracing::error!(kind = %self.kind, error = %e, "drain cycle failed, will retry");
                    tokio::time::sleep(self.config.backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChangeOp, ChangeRecord, MemoryStore};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Records applied state per entity id; idempotent by construction.
    #[derive(Default)]
    struct RecordingSink {
        rows: Mutex<HashMap<String, Option<EntityState>>>,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl DurableSink for RecordingSink {
        async fn apply(&self, _kind: EntityKind, batch: &[ChangeApply]) -> anyhow::Result<()> {
            if *self.fail.lock() {
                anyhow::bail!("sink down");
            }
            let mut rows = self.rows.lock();
            for change in batch {
                match change.record.operation {
                    ChangeOp::Delete => {
                        rows.remove(&change.record.entity_id);
                    }
                    _ => {
                        rows.insert(change.record.entity_id.clone(), change.state.clone());
                    }
                }
            }
            Ok(())
        }
    }

    async fn enqueue_asset_changes(store: &Arc<MemoryStore>, n: i64) {
        let queue = SyncQueue::new(Arc::clone(store));
        let assets = AssetStore::new(Arc::clone(store));
        for user in 0..n {
            assets.credit(user, "USDT", 100 + user, 1).await.unwrap();
            queue
                .enqueue(
                    EntityKind::Assets,
                    &ChangeRecord::new(format!("{}:USDT", user), ChangeOp::Update, user),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_drain_commits_and_clears_processing() {
        let store = Arc::new(MemoryStore::new());
        enqueue_asset_changes(&store, 3).await;
        let sink = Arc::new(RecordingSink::default());
        let worker = SyncWorker::new(
            EntityKind::Assets,
            Arc::clone(&store),
            Arc::clone(&sink),
            SyncConfig::default(),
        );

        let committed = worker.drain_once().await.unwrap();
        assert_eq!(committed, 3);
        assert_eq!(worker.queue.depth(EntityKind::Assets).await.unwrap(), 0);
        assert_eq!(
            worker
                .queue
                .processing_depth(EntityKind::Assets)
                .await
                .unwrap(),
            0
        );
        assert_eq!(sink.rows.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_commit_requeues_batch() {
        let store = Arc::new(MemoryStore::new());
        enqueue_asset_changes(&store, 2).await;
        let sink = Arc::new(RecordingSink::default());
        *sink.fail.lock() = true;
        let worker = SyncWorker::new(
            EntityKind::Assets,
            Arc::clone(&store),
            Arc::clone(&sink),
            SyncConfig::default(),
        );

        assert!(worker.drain_once().await.is_err());
        assert_eq!(worker.queue.depth(EntityKind::Assets).await.unwrap(), 2);
        assert_eq!(
            worker
                .queue
                .processing_depth(EntityKind::Assets)
                .await
                .unwrap(),
            0
        );

        // Sink heals; the retried cycle converges.
        *sink.fail.lock() = false;
        assert_eq!(worker.drain_once().await.unwrap(), 2);
        assert_eq!(sink.rows.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_recover_replays_processing_queue() {
        let store = Arc::new(MemoryStore::new());
        enqueue_asset_changes(&store, 2).await;
        let sink = Arc::new(RecordingSink::default());
        let worker = SyncWorker::new(
            EntityKind::Assets,
            Arc::clone(&store),
            Arc::clone(&sink),
            SyncConfig::default(),
        );

        // Simulate a crash after commit but before cleanup: the batch was
        // applied and still sits in the processing queue.
        let payloads = worker
            .queue
            .transfer_to_processing(EntityKind::Assets, 10)
            .await
            .unwrap();
        let batch = worker.resolve(&payloads).await.unwrap();
        sink.apply(EntityKind::Assets, &batch).await.unwrap();
        let mut before: Vec<String> = sink.rows.lock().keys().cloned().collect();
        before.sort();

        let replayed = worker.recover().await.unwrap();
        assert_eq!(replayed, 2);
        assert_eq!(
            worker
                .queue
                .processing_depth(EntityKind::Assets)
                .await
                .unwrap(),
            0
        );
        // Replay is idempotent: same relational rows as the clean run.
        let mut after: Vec<String> = sink.rows.lock().keys().cloned().collect();
        after.sort();
        assert_eq!(before, after);
    }
}
