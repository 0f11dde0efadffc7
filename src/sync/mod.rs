//! Durable-store synchronisation.
//!
//! Background workers drain the change queues into the relational store
//! with at-least-once semantics, and the seed loader pulls cold state the
//! other way on startup.

pub mod seed;
pub mod worker;

pub use seed::SeedLoader;
pub use worker::{SyncConfig, SyncWorker};

use async_trait::async_trait;

use crate::models::{Asset, Order, Trade, TradingPair};
use crate::store::ChangeRecord;

/// Current operational-store state resolved for one change record. The
/// payload itself is only a pointer; state is re-read at drain time.
#[derive(Debug, Clone)]
pub enum EntityState {
    Order(Order),
    Trade(Trade),
    Asset(Asset),
}

#[derive(Debug, Clone)]
pub struct ChangeApply {
    pub record: ChangeRecord,
    /// `None` when the entity no longer exists in the store.
    pub state: Option<EntityState>,
}

/// Relational write side. Implementations must be idempotent: applying the
/// same batch twice yields the same relational state.
#[async_trait]
pub trait DurableSink: Send + Sync + 'static {
    async fn apply(
        &self,
        kind: crate::store::EntityKind,
        batch: &[ChangeApply],
    ) -> anyhow::Result<()>;
}

/// Relational read side used by the seed loader.
#[async_trait]
pub trait SeedSource: Send + Sync + 'static {
    async fn trading_pairs(&self) -> anyhow::Result<Vec<TradingPair>>;
    async fn assets(&self) -> anyhow::Result<Vec<Asset>>;
    /// Orders still open (Active or PartiallyFilled).
    async fn open_orders(&self) -> anyhow::Result<Vec<Order>>;
    async fn max_order_id(&self) -> anyhow::Result<i64>;
    async fn max_trade_id(&self) -> anyhow::Result<i64>;
}
