//! Drain and crash-replay behaviour of the durable synchroniser, driven
//! end-to-end from matching activity on the in-memory store.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::*;
use parking_lot::Mutex;
use rust_decimal_macros::dec;

use spot_core::models::{OrderSide, OrderStatus};
use spot_core::store::{ChangeOp, EntityKind, MemoryStore, SyncQueue};
use spot_core::sync::{ChangeApply, DurableSink, EntityState, SyncConfig, SyncWorker};

/// Relational stand-in: rows keyed by entity id, idempotent upserts.
#[derive(Default)]
struct MemSink {
    rows: Mutex<HashMap<(EntityKind, String), String>>,
}

fn summarise(state: &EntityState) -> String {
    match state {
        EntityState::Order(o) => format!("{}:{}:{}", o.status, o.filled_quantity, o.average_price),
        EntityState::Trade(t) => format!("{}:{}", t.price, t.quantity),
        EntityState::Asset(a) => format!("{}:{}", a.available, a.frozen),
    }
}

impl MemSink {
    fn snapshot(&self) -> Vec<((EntityKind, String), String)> {
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        rows.sort();
        rows
    }
}

#[async_trait]
impl DurableSink for MemSink {
    async fn apply(&self, kind: EntityKind, batch: &[ChangeApply]) -> anyhow::Result<()> {
        let mut rows = self.rows.lock();
        for change in batch {
            let key = (kind, change.record.entity_id.clone());
            match (&change.record.operation, &change.state) {
                (ChangeOp::Delete, _) => {
                    rows.remove(&key);
                }
                (_, Some(state)) => {
                    rows.insert(key, summarise(state));
                }
                (_, None) => {}
            }
        }
        Ok(())
    }
}

fn worker(
    kind: EntityKind,
    store: &Arc<MemoryStore>,
    sink: &Arc<MemSink>,
) -> SyncWorker<MemoryStore, MemSink> {
    SyncWorker::new(kind, Arc::clone(store), Arc::clone(sink), SyncConfig::default())
}

async fn drain_all(store: &Arc<MemoryStore>, sink: &Arc<MemSink>) {
    for kind in EntityKind::ALL {
        let worker = worker(kind, store, sink);
        while worker.drain_once().await.expect("drain") > 0 {}
    }
}

#[tokio::test]
async fn test_drain_projects_final_state_to_relational_rows() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(100000)).await;
    h.fund(2, BTC, dec!(1)).await;

    let sell = h.limit(2, OrderSide::Sell, dec!(1), dec!(50000)).await;
    let buy = h.limit(1, OrderSide::Buy, dec!(1), dec!(51000)).await;
    assert_eq!(buy.status, OrderStatus::Filled);

    let sink = Arc::new(MemSink::default());
    drain_all(&h.store, &sink).await;

    let rows = sink.rows.lock();
    // Both orders project as filled; repeated enqueues for one id
    // collapsed into the final hash state.
    let sell_row = rows
        .get(&(EntityKind::Orders, sell.order_id.to_string()))
        .expect("sell row");
    assert!(sell_row.starts_with("filled"));
    let buy_row = rows
        .get(&(EntityKind::Orders, buy.order_id.to_string()))
        .expect("buy row");
    assert!(buy_row.starts_with("filled"));

    // One trade, four touched balance rows.
    assert_eq!(
        rows.keys().filter(|(k, _)| *k == EntityKind::Trades).count(),
        1
    );
    for entity in ["1:USDT", "1:BTC", "2:BTC", "2:USDT"] {
        assert!(
            rows.contains_key(&(EntityKind::Assets, entity.to_string())),
            "missing asset row {}",
            entity
        );
    }
    drop(rows);

    // Queues fully drained, nothing stuck in processing.
    let queue = SyncQueue::new(Arc::clone(&h.store));
    for kind in EntityKind::ALL {
        assert_eq!(queue.depth(kind).await.unwrap(), 0);
        assert_eq!(queue.processing_depth(kind).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn test_crash_between_commit_and_cleanup_replays_idempotently() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(500000)).await;
    h.fund(2, BTC, dec!(5)).await;

    // Five orders, some crossing, to give the queue a realistic mix.
    h.limit(2, OrderSide::Sell, dec!(1), dec!(50000)).await;
    h.limit(2, OrderSide::Sell, dec!(1), dec!(50100)).await;
    h.limit(1, OrderSide::Buy, dec!(1.5), dec!(50100)).await;
    h.limit(1, OrderSide::Buy, dec!(1), dec!(49000)).await;
    h.limit(2, OrderSide::Sell, dec!(1), dec!(52000)).await;

    let sink = Arc::new(MemSink::default());
    let queue = SyncQueue::new(Arc::clone(&h.store));

    // Drain the orders queue by hand up to the commit: the batch is
    // applied but the process "dies" before the processing queue is
    // deleted.
    let payloads = queue
        .transfer_to_processing(EntityKind::Orders, 500)
        .await
        .unwrap();
    assert!(!payloads.is_empty());
    let mut batch = Vec::new();
    for payload in &payloads {
        let record = SyncQueue::<MemoryStore>::parse(EntityKind::Orders, payload).unwrap();
        let id: i64 = record.entity_id.parse().unwrap();
        let state = h.orders.load(id).await.unwrap().map(EntityState::Order);
        batch.push(ChangeApply { record, state });
    }
    sink.apply(EntityKind::Orders, &batch).await.unwrap();
    let committed = sink.snapshot();
    assert!(
        queue
            .processing_depth(EntityKind::Orders)
            .await
            .unwrap()
            > 0
    );

    // Restart: recovery re-applies the leftover batch.
    let restarted = worker(EntityKind::Orders, &h.store, &sink);
    let replayed = restarted.recover().await.unwrap();
    assert_eq!(replayed, payloads.len());
    assert_eq!(
        queue.processing_depth(EntityKind::Orders).await.unwrap(),
        0
    );

    // Replay converged on the same relational state as the clean commit.
    assert_eq!(sink.snapshot(), committed);
}
