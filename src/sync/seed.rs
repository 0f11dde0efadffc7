//! Seed loader.
//!
//! One-shot on startup: pulls cold state from the relational store into
//! the operational store. Guarded by per-kind markers so a restart with a
//! warm store does not re-seed; clearing the marker forces a reload.

use std::sync::Arc;

use crate::store::{keys, AssetStore, EntityKind, OperationalStore, OrderStore, StoreError};

use super::SeedSource;

pub struct SeedLoader<S, D> {
    store: Arc<S>,
    orders: OrderStore<S>,
    assets: AssetStore<S>,
    source: Arc<D>,
}

impl<S: OperationalStore, D: SeedSource> SeedLoader<S, D> {
    pub fn new(store: Arc<S>, source: Arc<D>) -> Self {
        Self {
            orders: OrderStore::new(Arc::clone(&store)),
            assets: AssetStore::new(Arc::clone(&store)),
            store,
            source,
        }
    }

    /// Run every pending seed step. Returns the active trading pairs,
    /// which the caller needs to start the matching lanes either way.
    pub async fn run(&self) -> anyhow::Result<Vec<crate::models::TradingPair>> {
        let pairs = self.source.trading_pairs().await?;

        for kind in EntityKind::ALL {
            let marker = keys::seed_marker(kind);
            if self.store.get(&marker).await?.is_some() {
                tracing::debug!(%kind, "seed marker present, skipping");
                continue;
            }
            match kind {
                EntityKind::Orders => self.seed_orders().await?,
                EntityKind::Assets => self.seed_assets().await?,
                // The trade log is write-through; there is no hot-path
                // read to warm.
                EntityKind::Trades => {
                    let max_trade_id = self.source.max_trade_id().await?;
                    self.store
                        .set(keys::TRADE_ID_COUNTER, &max_trade_id.to_string())
                        .await?;
                }
            }
            self.store.set(&marker, "1").await?;
            tracing::info!(%kind, "seed completed");
        }

        Ok(pairs)
    }

    async fn seed_orders(&self) -> anyhow::Result<()> {
        let open_orders = self.source.open_orders().await?;
        let count = open_orders.len();
        for order in &open_orders {
            self.orders.save(order).await?;
            self.orders.index_for_user(order).await?;
            if let Some(price) = order.price {
                self.orders.index_active(order, price).await?;
            }
        }
        // Keep the id counter ahead of everything ever persisted.
        let max_order_id = self.source.max_order_id().await?;
        self.store
            .set(keys::ORDER_ID_COUNTER, &max_order_id.to_string())
            .await?;
        tracing::info!(count, "seeded open orders");
        Ok(())
    }

    async fn seed_assets(&self) -> anyhow::Result<()> {
        let rows = self.source.assets().await?;
        let count = rows.len();
        for asset in &rows {
            self.assets.save(asset).await?;
        }
        tracing::info!(count, "seeded asset balances");
        Ok(())
    }
}

/// True once every kind's marker is present (readiness gate).
pub async fn completed<S: OperationalStore>(store: &S) -> Result<bool, StoreError> {
    for kind in EntityKind::ALL {
        if store.get(&keys::seed_marker(kind)).await?.is_none() {
            return Ok(false);
        }
    }
    Ok(true)
}
