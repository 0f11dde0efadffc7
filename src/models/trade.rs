use serde::{Deserialize, Serialize};

use super::order::OrderSide;
use super::units::Quanta;

/// An executed trade. Immutable once written; `price * quantity` is the
/// notional moved in quote currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub trading_pair_id: i64,
    pub symbol: String,
    pub buy_order_id: i64,
    pub sell_order_id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub price: Quanta,
    pub quantity: Quanta,
    /// Opaque additive fee, never moved by settlement.
    pub fee: Quanta,
    pub fee_asset: String,
    pub taker_side: OrderSide,
    pub executed_at: i64,
}
