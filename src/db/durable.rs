//! Postgres implementation of the durable sink and seed source.
//!
//! Drain translations are idempotent upserts keyed on entity ids, so a
//! replayed batch converges to the same relational state. Amounts cross
//! the boundary as `Decimal`; everything internal stays in quanta.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::models::units::{from_quanta, to_quanta};
use crate::models::{Asset, Order, OrderSide, OrderStatus, OrderType, Trade, TradingPair};
use crate::store::{ChangeOp, EntityKind};
use crate::sync::{ChangeApply, DurableSink, EntityState, SeedSource};

pub struct PgDurable {
    pool: PgPool,
}

impl PgDurable {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn apply_order(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        change: &ChangeApply,
    ) -> anyhow::Result<()> {
        if change.record.operation == ChangeOp::Delete {
            let id: i64 = change.record.entity_id.parse()?;
            sqlx::query("DELETE FROM orders WHERE id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await?;
            return Ok(());
        }
        let Some(EntityState::Order(order)) = &change.state else {
            // Entity vanished between enqueue and drain; nothing to write.
            return Ok(());
        };
        // Create inserts once; Update upserts to cover late seed races.
        let on_conflict = match change.record.operation {
            ChangeOp::Create => "DO NOTHING",
            _ => {
                "DO UPDATE SET \
                 status = EXCLUDED.status, \
                 filled_quantity = EXCLUDED.filled_quantity, \
                 average_price = EXCLUDED.average_price, \
                 updated_at = EXCLUDED.updated_at"
            }
        };
        let sql = format!(
            "INSERT INTO orders \
             (id, user_id, trading_pair_id, symbol, side, order_type, price, quantity, \
              filled_quantity, average_price, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, \
                     to_timestamp($12::double precision / 1000), \
                     to_timestamp($13::double precision / 1000)) \
             ON CONFLICT (id) {}",
            on_conflict
        );
        sqlx::query(&sql)
            .bind(order.id)
            .bind(order.user_id)
            .bind(order.trading_pair_id)
            .bind(&order.symbol)
            .bind(order.side)
            .bind(order.order_type)
            .bind(order.price.map(from_quanta))
            .bind(from_quanta(order.quantity))
            .bind(from_quanta(order.filled_quantity))
            .bind(from_quanta(order.average_price))
            .bind(order.status)
            .bind(order.created_at as f64)
            .bind(order.updated_at as f64)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn apply_trade(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        change: &ChangeApply,
    ) -> anyhow::Result<()> {
        let Some(EntityState::Trade(trade)) = &change.state else {
            return Ok(());
        };
        sqlx::query(
            "INSERT INTO trades \
             (id, trading_pair_id, symbol, buy_order_id, sell_order_id, buyer_id, seller_id, \
              price, quantity, fee, fee_asset, taker_side, executed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
                     to_timestamp($13::double precision / 1000)) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(trade.id)
        .bind(trade.trading_pair_id)
        .bind(&trade.symbol)
        .bind(trade.buy_order_id)
        .bind(trade.sell_order_id)
        .bind(trade.buyer_id)
        .bind(trade.seller_id)
        .bind(from_quanta(trade.price))
        .bind(from_quanta(trade.quantity))
        .bind(from_quanta(trade.fee))
        .bind(&trade.fee_asset)
        .bind(trade.taker_side)
        .bind(trade.executed_at as f64)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn apply_asset(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        change: &ChangeApply,
    ) -> anyhow::Result<()> {
        let Some(EntityState::Asset(asset)) = &change.state else {
            return Ok(());
        };
        sqlx::query(
            "INSERT INTO assets (user_id, currency, available, frozen, updated_at) \
             VALUES ($1, $2, $3, $4, to_timestamp($5::double precision / 1000)) \
             ON CONFLICT (user_id, currency) DO UPDATE SET \
             available = EXCLUDED.available, \
             frozen = EXCLUDED.frozen, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(asset.user_id)
        .bind(&asset.currency)
        .bind(from_quanta(asset.available))
        .bind(from_quanta(asset.frozen))
        .bind(asset.updated_at as f64)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DurableSink for PgDurable {
    async fn apply(&self, kind: EntityKind, batch: &[ChangeApply]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for change in batch {
            match kind {
                EntityKind::Orders => Self::apply_order(&mut tx, change).await?,
                EntityKind::Trades => Self::apply_trade(&mut tx, change).await?,
                EntityKind::Assets => Self::apply_asset(&mut tx, change).await?,
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// Seed queries
// ============================================================================

#[derive(sqlx::FromRow)]
struct PairRow {
    id: i64,
    symbol: String,
    base_asset: String,
    quote_asset: String,
    price_precision: i32,
    quantity_precision: i32,
    min_quantity: Decimal,
    max_quantity: Decimal,
    is_active: bool,
}

impl TryFrom<PairRow> for TradingPair {
    type Error = anyhow::Error;

    fn try_from(row: PairRow) -> anyhow::Result<Self> {
        Ok(TradingPair {
            id: row.id,
            symbol: row.symbol,
            base_asset: row.base_asset,
            quote_asset: row.quote_asset,
            price_precision: row.price_precision as u32,
            quantity_precision: row.quantity_precision as u32,
            min_quantity: to_quanta(row.min_quantity)?,
            max_quantity: to_quanta(row.max_quantity)?,
            is_active: row.is_active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AssetRow {
    user_id: i64,
    currency: String,
    available: Decimal,
    frozen: Decimal,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssetRow> for Asset {
    type Error = anyhow::Error;

    fn try_from(row: AssetRow) -> anyhow::Result<Self> {
        Ok(Asset {
            user_id: row.user_id,
            currency: row.currency,
            available: to_quanta(row.available)?,
            frozen: to_quanta(row.frozen)?,
            updated_at: row.updated_at.timestamp_millis(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    trading_pair_id: i64,
    symbol: String,
    side: OrderSide,
    order_type: OrderType,
    price: Option<Decimal>,
    quantity: Decimal,
    filled_quantity: Decimal,
    average_price: Decimal,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = anyhow::Error;

    fn try_from(row: OrderRow) -> anyhow::Result<Self> {
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            trading_pair_id: row.trading_pair_id,
            symbol: row.symbol,
            side: row.side,
            order_type: row.order_type,
            quantity: to_quanta(row.quantity)?,
            price: row.price.map(to_quanta).transpose()?,
            filled_quantity: to_quanta(row.filled_quantity)?,
            average_price: to_quanta(row.average_price)?,
            status: row.status,
            created_at: row.created_at.timestamp_millis(),
            updated_at: row.updated_at.timestamp_millis(),
        })
    }
}

#[async_trait]
impl SeedSource for PgDurable {
    async fn trading_pairs(&self) -> anyhow::Result<Vec<TradingPair>> {
        let rows: Vec<PairRow> = sqlx::query_as(
            "SELECT id, symbol, base_asset, quote_asset, price_precision, quantity_precision, \
             min_quantity, max_quantity, is_active \
             FROM trading_pairs WHERE is_active = TRUE ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn assets(&self) -> anyhow::Result<Vec<Asset>> {
        let rows: Vec<AssetRow> = sqlx::query_as(
            "SELECT user_id, currency, available, frozen, updated_at FROM assets",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn open_orders(&self) -> anyhow::Result<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            "SELECT id, user_id, trading_pair_id, symbol, side, order_type, price, quantity, \
             filled_quantity, average_price, status, created_at, updated_at \
             FROM orders \
             WHERE status IN ('active'::order_status, 'partially_filled'::order_status) \
             ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn max_order_id(&self) -> anyhow::Result<i64> {
        let max: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(max)
    }

    async fn max_trade_id(&self) -> anyhow::Result<i64> {
        let max: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) FROM trades")
            .fetch_one(&self.pool)
            .await?;
        Ok(max)
    }
}
