//! Key and channel layout of the operational store.

use crate::models::OrderSide;
use crate::store::EntityKind;

/// Order hash.
pub fn order(order_id: i64) -> String {
    format!("order:{}", order_id)
}

/// Per-user order index (sorted set scored by creation time).
pub fn user_orders(user_id: i64) -> String {
    format!("user_orders:{}", user_id)
}

/// Active-book index per symbol and side (sorted set; score = price).
pub fn active_orders(symbol: &str, side: OrderSide) -> String {
    format!("orders:active:{}:{}", symbol, side)
}

/// Asset hash. The brace tag keeps the row colocated when the backend is
/// sharded.
pub fn asset(user_id: i64, currency: &str) -> String {
    format!("asset:{{{}}}:{}:{}", currency, user_id, currency)
}

/// Trade hash.
pub fn trade(trade_id: i64) -> String {
    format!("trade:{}", trade_id)
}

pub const ORDER_ID_COUNTER: &str = "global:order_id";
pub const TRADE_ID_COUNTER: &str = "global:trade_id";

/// Change queue per entity kind.
pub fn sync_queue(kind: EntityKind) -> String {
    format!("sync_queue:{}", kind)
}

/// Drain backup queue per entity kind.
pub fn sync_queue_processing(kind: EntityKind) -> String {
    format!("sync_queue:{}:processing", kind)
}

/// Seed marker per entity kind.
pub fn seed_marker(kind: EntityKind) -> String {
    format!("seed:{}:done", kind)
}

// ==================== Broadcast groups / channels ====================

pub fn group_orderbook(symbol: &str) -> String {
    format!("orderbook:{}", symbol)
}

pub fn group_trades(symbol: &str) -> String {
    format!("trades:{}", symbol)
}

pub fn group_ticker(symbol: &str) -> String {
    format!("ticker:{}", symbol)
}

pub fn group_kline(symbol: &str, interval: &str) -> String {
    format!("kline:{}:{}", symbol, interval)
}

pub fn group_user(user_id: i64) -> String {
    format!("user:{}", user_id)
}
