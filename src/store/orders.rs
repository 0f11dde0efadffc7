//! Order hash and index accessors.
//!
//! Orders live at `order:{orderId}` with integer-coded enums and quanta
//! amounts so the settlement scripts and the drain path stay integer-only.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;

use crate::models::units::{from_quanta, Quanta};
use crate::models::{Order, OrderSide, OrderStatus, OrderType};

use super::{keys, OperationalStore, StoreError};

pub struct OrderStore<S> {
    store: Arc<S>,
}

impl<S> Clone for OrderStore<S> {
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

impl<S: OperationalStore> OrderStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Allocate the next globally increasing order id.
    pub async fn next_id(&self) -> Result<i64, StoreError> {
        self.store.incr(keys::ORDER_ID_COUNTER).await
    }

    pub async fn save(&self, order: &Order) -> Result<(), StoreError> {
        let mut fields = vec![
            ("id".to_string(), order.id.to_string()),
            ("user_id".to_string(), order.user_id.to_string()),
            ("pair_id".to_string(), order.trading_pair_id.to_string()),
            ("symbol".to_string(), order.symbol.clone()),
            ("side".to_string(), order.side.as_code().to_string()),
            ("type".to_string(), order.order_type.as_code().to_string()),
            ("quantity".to_string(), order.quantity.to_string()),
            (
                "filled_quantity".to_string(),
                order.filled_quantity.to_string(),
            ),
            (
                "average_price".to_string(),
                order.average_price.to_string(),
            ),
            ("status".to_string(), order.status.as_code().to_string()),
            ("created_at".to_string(), order.created_at.to_string()),
            ("updated_at".to_string(), order.updated_at.to_string()),
        ];
        if let Some(price) = order.price {
            fields.push(("price".to_string(), price.to_string()));
        }
        self.store.hset_multiple(&keys::order(order.id), &fields).await
    }

    pub async fn load(&self, order_id: i64) -> Result<Option<Order>, StoreError> {
        let key = keys::order(order_id);
        let fields = self.store.hgetall(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::from_fields(&key, &fields)?))
    }

    pub fn from_fields(
        key: &str,
        fields: &HashMap<String, String>,
    ) -> Result<Order, StoreError> {
        let side_code = required_i64(fields, key, "side")?;
        let type_code = required_i64(fields, key, "type")?;
        let status_code = required_i64(fields, key, "status")?;

        let order_type =
            OrderType::from_code(type_code).ok_or_else(|| StoreError::Corrupt {
                key: key.to_string(),
                detail: format!("unknown order type code {}", type_code),
            })?;

        let price = match fields.get("price") {
            Some(raw) => Some(raw.parse::<Quanta>().map_err(|_| StoreError::Corrupt {
                key: key.to_string(),
                detail: "non-numeric price".to_string(),
            })?),
            None => None,
        };

        Ok(Order {
            id: required_i64(fields, key, "id")?,
            user_id: required_i64(fields, key, "user_id")?,
            trading_pair_id: required_i64(fields, key, "pair_id")?,
            symbol: fields.get("symbol").cloned().unwrap_or_default(),
            side: OrderSide::from_code(side_code).ok_or_else(|| StoreError::Corrupt {
                key: key.to_string(),
                detail: format!("unknown side code {}", side_code),
            })?,
            order_type,
            quantity: required_i64(fields, key, "quantity")?,
            price,
            filled_quantity: required_i64(fields, key, "filled_quantity")?,
            average_price: required_i64(fields, key, "average_price")?,
            status: OrderStatus::from_code(status_code).ok_or_else(|| StoreError::Corrupt {
                key: key.to_string(),
                detail: format!("unknown status code {}", status_code),
            })?,
            created_at: required_i64(fields, key, "created_at")?,
            updated_at: required_i64(fields, key, "updated_at")?,
        })
    }

    /// Add the order to its owner's index.
    pub async fn index_for_user(&self, order: &Order) -> Result<(), StoreError> {
        self.store
            .zadd(
                &keys::user_orders(order.user_id),
                order.created_at as f64,
                &order.id.to_string(),
            )
            .await?;
        Ok(())
    }

    /// Add the order to the active-book index (score = price).
    pub async fn index_active(&self, order: &Order, price: Quanta) -> Result<(), StoreError> {
        let score = from_quanta(price).to_f64().unwrap_or(0.0);
        self.store
            .zadd(
                &keys::active_orders(&order.symbol, order.side),
                score,
                &order.id.to_string(),
            )
            .await?;
        Ok(())
    }

    pub async fn unindex_active(&self, order: &Order) -> Result<(), StoreError> {
        self.store
            .zrem(
                &keys::active_orders(&order.symbol, order.side),
                &order.id.to_string(),
            )
            .await?;
        Ok(())
    }

    /// Ids currently in the active-book index for one side.
    pub async fn active_ids(
        &self,
        symbol: &str,
        side: OrderSide,
    ) -> Result<Vec<i64>, StoreError> {
        let key = keys::active_orders(symbol, side);
        let members = self.store.zrange(&key, 0, -1, true).await?;
        members
            .into_iter()
            .map(|m| {
                m.parse().map_err(|_| StoreError::Corrupt {
                    key: key.clone(),
                    detail: format!("non-numeric order id `{}`", m),
                })
            })
            .collect()
    }
}
