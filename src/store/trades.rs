//! Trade log accessors. Trades are written once at the matching step and
//! never mutated.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{OrderSide, Trade};

use super::{keys, OperationalStore, StoreError};

pub struct TradeStore<S> {
    store: Arc<S>,
}

impl<S> Clone for TradeStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

fn required_i64(
    fields: &HashMap<String, String>,
    key: &str,
    field: &str,
) -> Result<i64, StoreError> {
    fields
        .get(field)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| StoreError::Corrupt {
            key: key.to_string(),
            detail: format!("missing or non-numeric field `{}`", field),
        })
}

impl<S: OperationalStore> TradeStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Allocate the next globally increasing trade id.
    pub async fn next_id(&self) -> Result<i64, StoreError> {
        self.store.incr(keys::TRADE_ID_COUNTER).await
    }

    pub async fn save(&self, trade: &Trade) -> Result<(), StoreError> {
        let fields = vec![
            ("id".to_string(), trade.id.to_string()),
            ("pair_id".to_string(), trade.trading_pair_id.to_string()),
            ("symbol".to_string(), trade.symbol.clone()),
            ("buy_order_id".to_string(), trade.buy_order_id.to_string()),
            ("sell_order_id".to_string(), trade.sell_order_id.to_string()),
            ("buyer_id".to_string(), trade.buyer_id.to_string()),
            ("seller_id".to_string(), trade.seller_id.to_string()),
            ("price".to_string(), trade.price.to_string()),
            ("quantity".to_string(), trade.quantity.to_string()),
            ("fee".to_string(), trade.fee.to_string()),
            ("fee_asset".to_string(), trade.fee_asset.clone()),
            (
                "taker_side".to_string(),
                trade.taker_side.as_code().to_string(),
            ),
            ("executed_at".to_string(), trade.executed_at.to_string()),
        ];
        self.store.hset_multiple(&keys::trade(trade.id), &fields).await
    }

    pub async fn load(&self, trade_id: i64) -> Result<Option<Trade>, StoreError> {
        let key = keys::trade(trade_id);
        let fields = self.store.hgetall(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let taker_code = required_i64(&fields, &key, "taker_side")?;
        Ok(Some(Trade {
            id: required_i64(&fields, &key, "id")?,
            trading_pair_id: required_i64(&fields, &key, "pair_id")?,
            symbol: fields.get("symbol").cloned().unwrap_or_default(),
            buy_order_id: required_i64(&fields, &key, "buy_order_id")?,
            sell_order_id: required_i64(&fields, &key, "sell_order_id")?,
            buyer_id: required_i64(&fields, &key, "buyer_id")?,
            seller_id: required_i64(&fields, &key, "seller_id")?,
            price: required_i64(&fields, &key, "price")?,
            quantity: required_i64(&fields, &key, "quantity")?,
            fee: required_i64(&fields, &key, "fee")?,
            fee_asset: fields.get("fee_asset").cloned().unwrap_or_default(),
            taker_side: OrderSide::from_code(taker_code).ok_or_else(|| {
                StoreError::Corrupt {
                    key: key.clone(),
                    detail: format!("unknown side code {}", taker_code),
                }
            })?,
            executed_at: required_i64(&fields, &key, "executed_at")?,
        }))
    }
}
