//! Asset balance accessors.
//!
//! Balances are mutated only through the settlement scripts while trading
//! is live; `credit` exists for seeding and deposit handoff.

use std::sync::Arc;

use crate::models::units::Quanta;
use crate::models::Asset;

use super::{keys, scripts, OperationalStore, StoreError};

pub struct AssetStore<S> {
    store: Arc<S>,
}

impl<S> Clone for AssetStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: OperationalStore> AssetStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Move `amount` from available to frozen. Returns false when the
    /// available balance is short.
    pub async fn freeze(
        &self,
        user_id: i64,
        currency: &str,
        amount: Quanta,
        now: i64,
    ) -> Result<bool, StoreError> {
        let result = self
            .store
            .eval_script(
                &scripts::FREEZE,
                &[keys::asset(user_id, currency)],
                &[amount, now],
            )
            .await?;
        Ok(result == 1)
    }

    /// Move `amount` from frozen back to available. Returns false when the
    /// frozen balance is short.
    pub async fn unfreeze(
        &self,
        user_id: i64,
        currency: &str,
        amount: Quanta,
        now: i64,
    ) -> Result<bool, StoreError> {
        let result = self
            .store
            .eval_script(
                &scripts::UNFREEZE,
                &[keys::asset(user_id, currency)],
                &[amount, now],
            )
            .await?;
        Ok(result == 1)
    }

    /// Settle one trade across the four balance rows in a single atomic
    /// step. `cost` is `price * quantity` in quote quanta.
    pub async fn execute_trade(
        &self,
        buyer_id: i64,
        seller_id: i64,
        base: &str,
        quote: &str,
        cost: Quanta,
        quantity: Quanta,
        now: i64,
    ) -> Result<bool, StoreError> {
        let keys = [
            keys::asset(buyer_id, quote),
            keys::asset(buyer_id, base),
            keys::asset(seller_id, base),
            keys::asset(seller_id, quote),
        ];
        let result = self
            .store
            .eval_script(&scripts::EXECUTE_TRADE, &keys, &[cost, quantity, now])
            .await?;
        Ok(result == 1)
    }

    /// Credit available balance outside live trading (seed, deposits).
    pub async fn credit(
        &self,
        user_id: i64,
        currency: &str,
        amount: Quanta,
        now: i64,
    ) -> Result<(), StoreError> {
        let key = keys::asset(user_id, currency);
        self.store.hincrby(&key, "available", amount).await?;
        self.store
            .hset_multiple(&key, &[("updated_at".to_string(), now.to_string())])
            .await
    }

    /// Write a full row (seed path).
    pub async fn save(&self, asset: &Asset) -> Result<(), StoreError> {
        let key = keys::asset(asset.user_id, &asset.currency);
        self.store
            .hset_multiple(
                &key,
                &[
                    ("available".to_string(), asset.available.to_string()),
                    ("frozen".to_string(), asset.frozen.to_string()),
                    ("updated_at".to_string(), asset.updated_at.to_string()),
                ],
            )
            .await
    }

    /// Read a row; absent rows are all-zero (lazily created on first
    /// credit or freeze).
    pub async fn load(&self, user_id: i64, currency: &str) -> Result<Asset, StoreError> {
        let key = keys::asset(user_id, currency);
        let fields = self.store.hgetall(&key).await?;
        let get = |name: &str| -> i64 {
            fields
                .get(name)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0)
        };
        Ok(Asset {
            user_id,
            currency: currency.to_string(),
            available: get("available"),
            frozen: get("frozen"),
            updated_at: get("updated_at"),
        })
    }
}
