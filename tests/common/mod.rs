//! Shared test harness: a matching engine over the in-memory store.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use spot_core::engine::{EngineError, MatchingEngine, NewOrder, OrderAck};
use spot_core::models::units::{from_quanta, to_quanta};
use spot_core::models::{Order, OrderSide, OrderType, TradingPair};
use spot_core::publisher::PublisherHub;
use spot_core::store::{AssetStore, MemoryStore, OrderStore, TradeStore};

pub const BTC: &str = "BTC";
pub const USDT: &str = "USDT";

pub fn btc_usdt() -> TradingPair {
    TradingPair {
        id: 1,
        symbol: "BTCUSDT".to_string(),
        base_asset: BTC.to_string(),
        quote_asset: USDT.to_string(),
        price_precision: 2,
        quantity_precision: 6,
        min_quantity: to_quanta(dec!(0.000001)).unwrap(),
        max_quantity: to_quanta(dec!(1000)).unwrap(),
        is_active: true,
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub hub: Arc<PublisherHub>,
    pub engine: Arc<MatchingEngine<MemoryStore>>,
    pub assets: AssetStore<MemoryStore>,
    pub orders: OrderStore<MemoryStore>,
    pub trades: TradeStore<MemoryStore>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_pairs(vec![btc_usdt()]).await
    }

    pub async fn with_pairs(pairs: Vec<TradingPair>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(PublisherHub::default());
        let engine = MatchingEngine::start(
            Arc::clone(&store),
            Arc::clone(&hub),
            pairs,
            Duration::from_secs(2),
        )
        .await
        .expect("engine start");
        Self {
            assets: AssetStore::new(Arc::clone(&store)),
            orders: OrderStore::new(Arc::clone(&store)),
            trades: TradeStore::new(Arc::clone(&store)),
            store,
            hub,
            engine,
        }
    }

    pub async fn fund(&self, user_id: i64, currency: &str, amount: Decimal) {
        self.assets
            .credit(user_id, currency, to_quanta(amount).unwrap(), 0)
            .await
            .expect("credit");
    }

    /// (available, frozen) in decimals.
    pub async fn balances(&self, user_id: i64, currency: &str) -> (Decimal, Decimal) {
        let asset = self.assets.load(user_id, currency).await.expect("load asset");
        (from_quanta(asset.available), from_quanta(asset.frozen))
    }

    /// Sum of available + frozen over the given users, for conservation
    /// checks.
    pub async fn total_holdings(&self, currency: &str, users: &[i64]) -> Decimal {
        let mut total = Decimal::ZERO;
        for &user_id in users {
            let (available, frozen) = self.balances(user_id, currency).await;
            total += available + frozen;
        }
        total
    }

    pub async fn limit(
        &self,
        user_id: i64,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> OrderAck {
        self.try_limit(user_id, side, quantity, price)
            .await
            .expect("limit order")
    }

    pub async fn try_limit(
        &self,
        user_id: i64,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<OrderAck, EngineError> {
        self.engine
            .submit(NewOrder {
                user_id,
                symbol: "BTCUSDT".to_string(),
                side,
                order_type: OrderType::Limit,
                quantity: to_quanta(quantity).unwrap(),
                price: Some(to_quanta(price).unwrap()),
            })
            .await
    }

    /// Market order; for buys `quantity` is the quote budget.
    pub async fn market(&self, user_id: i64, side: OrderSide, quantity: Decimal) -> OrderAck {
        self.engine
            .submit(NewOrder {
                user_id,
                symbol: "BTCUSDT".to_string(),
                side,
                order_type: OrderType::Market,
                quantity: to_quanta(quantity).unwrap(),
                price: None,
            })
            .await
            .expect("market order")
    }

    pub async fn order(&self, order_id: i64) -> Order {
        self.orders
            .load(order_id)
            .await
            .expect("load order")
            .expect("order exists")
    }

    /// (price, qty) depth levels, best first.
    pub async fn depth(&self, side: OrderSide, levels: usize) -> Vec<(Decimal, Decimal)> {
        let snapshot = self.engine.depth("BTCUSDT", levels).await.expect("depth");
        let picked = match side {
            OrderSide::Buy => snapshot.bids,
            OrderSide::Sell => snapshot.asks,
        };
        picked
            .into_iter()
            .map(|level| (from_quanta(level.price), from_quanta(level.quantity)))
            .collect()
    }
}
