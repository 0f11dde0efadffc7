//! Per-symbol matching lane.
//!
//! A single-writer task that owns its order book exclusively and consumes
//! a bounded intake channel FIFO. Every mutation of trading state for the
//! symbol happens here; the only shared resource is the operational store,
//! which serialises conflicting scripts itself.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::models::units::{affordable_quantity, from_quanta, notional, Quanta};
use crate::models::{Order, OrderSide, OrderStatus, OrderType, Trade, TradingPair};
use crate::publisher::{PublisherHub, PushMessage};
use crate::store::{
    keys, AssetStore, ChangeOp, ChangeRecord, EntityKind, OperationalStore, OrderStore,
    StoreError, SyncQueue, TradeStore,
};

use super::book::{BookEntry, OrderBook};
use super::types::{DepthSnapshot, EngineError, Fill, LaneCommand, LaneEvent, NewOrder, OrderAck};

/// Fee recorded on each trade: 0.1% of the notional, in quote currency.
/// Opaque and additive; settlement never moves it.
const FEE_DIVISOR: i64 = 1000;

const VOLUME_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn weighted_average(avg: Quanta, filled: Quanta, price: Quanta, quantity: Quanta) -> Quanta {
    let total = filled + quantity;
    if total == 0 {
        return 0;
    }
    ((avg as i128 * filled as i128 + price as i128 * quantity as i128) / total as i128) as i64
}

pub(crate) struct Lane<S> {
    pair: TradingPair,
    orders: OrderStore<S>,
    assets: AssetStore<S>,
    trades: TradeStore<S>,
    queue: SyncQueue<S>,
    hub: Arc<PublisherHub>,
    book: OrderBook,
    heartbeat: Arc<AtomicI64>,
    halted: Arc<AtomicBool>,
    /// (executed_at, base quantity) ring backing the 24h ticker volume.
    volume_window: VecDeque<(i64, Quanta)>,
    volume_total: Quanta,
}

impl<S: OperationalStore> Lane<S> {
    pub fn new(
        pair: TradingPair,
        store: Arc<S>,
        hub: Arc<PublisherHub>,
        heartbeat: Arc<AtomicI64>,
        halted: Arc<AtomicBool>,
    ) -> Self {
        let book = OrderBook::new(pair.symbol.clone());
        Self {
            pair,
            orders: OrderStore::new(Arc::clone(&store)),
            assets: AssetStore::new(Arc::clone(&store)),
            trades: TradeStore::new(Arc::clone(&store)),
            queue: SyncQueue::new(store),
            hub,
            book,
            heartbeat,
            halted,
            volume_window: VecDeque::new(),
            volume_total: 0,
        }
    }

    /// Rebuild the in-memory book from the active-order index. Runs once
    /// before the lane starts consuming intake.
    pub async fn bootstrap(&mut self) -> Result<usize, StoreError> {
        let mut resting = Vec::new();
        for side in [OrderSide::Buy, OrderSide::Sell] {
            for order_id in self.orders.active_ids(&self.pair.symbol, side).await? {
                let Some(order) = self.orders.load(order_id).await? else {
                    continue;
                };
                let live = matches!(
                    order.status,
                    OrderStatus::Active | OrderStatus::PartiallyFilled
                );
                if live && order.remaining() > 0 && order.price.is_some() {
                    resting.push(order);
                }
            }
        }
        // zset members lose time order within a price level; restore FIFO
        resting.sort_by_key(|o| (o.created_at, o.id));
        let count = resting.len();
        for order in resting {
            self.book.add(BookEntry {
                order_id: order.id,
                user_id: order.user_id,
                side: order.side,
                price: order.price.unwrap_or(0),
                quantity: order.quantity,
                filled: order.filled_quantity,
                created_at: order.created_at,
            });
        }
        Ok(count)
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<LaneEvent>) {
        let mut tick = interval(Duration::from_secs(5));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.heartbeat.store(now_ms(), Ordering::Relaxed);
                }
                event = rx.recv() => {
                    let Some(LaneEvent { deadline, command }) = event else { break };
                    self.heartbeat.store(now_ms(), Ordering::Relaxed);

                    if self.halted.load(Ordering::Relaxed) {
                        Self::refuse(command);
                        continue;
                    }
                    if Instant::now() > deadline {
                        Self::expire(command);
                        continue;
                    }

                    match command {
                        LaneCommand::Place { order, reply } => {
                            let result = self.handle_place(order).await;
                            let _ = reply.send(result);
                        }
                        LaneCommand::Cancel { order_id, caller, reply } => {
                            let result = self.handle_cancel(order_id, caller).await;
                            let _ = reply.send(result);
                        }
                        LaneCommand::Depth { levels, reply } => {
                            let _ = reply.send(Ok(self.depth_snapshot(levels)));
                        }
                    }
                }
            }
        }
        tracing::info!(symbol = %self.pair.symbol, "matching lane stopped");
    }

    fn refuse(command: LaneCommand) {
        match command {
            LaneCommand::Place { reply, .. } => {
                let _ = reply.send(Err(EngineError::LaneUnavailable));
            }
            LaneCommand::Cancel { reply, .. } => {
                let _ = reply.send(Err(EngineError::LaneUnavailable));
            }
            LaneCommand::Depth { reply, .. } => {
                let _ = reply.send(Err(EngineError::LaneUnavailable));
            }
        }
    }

    fn expire(command: LaneCommand) {
        match command {
            LaneCommand::Place { reply, .. } => {
                let _ = reply.send(Err(EngineError::IntakeExpired));
            }
            LaneCommand::Cancel { reply, .. } => {
                let _ = reply.send(Err(EngineError::IntakeExpired));
            }
            LaneCommand::Depth { reply, .. } => {
                let _ = reply.send(Err(EngineError::IntakeExpired));
            }
        }
    }

    // ========================================================================
    // Place
    // ========================================================================

    async fn handle_place(&mut self, new_order: NewOrder) -> Result<OrderAck, EngineError> {
        let timer = crate::metrics::Timer::new();
        let now = now_ms();
        let order_id = self.orders.next_id().await?;
        let mut order = Order {
            id: order_id,
            user_id: new_order.user_id,
            trading_pair_id: self.pair.id,
            symbol: self.pair.symbol.clone(),
            side: new_order.side,
            order_type: new_order.order_type,
            quantity: new_order.quantity,
            price: new_order.price,
            filled_quantity: 0,
            average_price: 0,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        crate::metrics::record_order_submitted(
            &order.side.to_string(),
            &order.order_type.to_string(),
        );

        // 1. Validation
        if let Err(reason) = self.validate(&order) {
            crate::metrics::record_order_rejected("validation");
            return self.reject(order, reason).await;
        }

        // 2. Freeze funds in one atomic step
        let (freeze_currency, freeze_amount) = self.freeze_terms(&order);
        if !self
            .assets
            .freeze(order.user_id, &freeze_currency, freeze_amount, now)
            .await?
        {
            crate::metrics::record_order_rejected("insufficient_funds");
            return self
                .reject(order, format!("insufficient {} balance", freeze_currency))
                .await;
        }
        self.asset_changed(order.user_id, &freeze_currency, now).await?;

        // 3. Cross the book
        let is_market_buy =
            order.order_type == OrderType::Market && order.side == OrderSide::Buy;
        let mut budget_left = if is_market_buy { freeze_amount } else { 0 };
        let mut quote_moved: Quanta = 0;
        let mut fills: Vec<Fill> = Vec::new();
        let mut auto_cancels: Vec<i64> = Vec::new();
        let mut settlement_aborted = false;

        loop {
            let taker_live = if is_market_buy {
                budget_left > 0
            } else {
                order.remaining() > 0
            };
            if !taker_live {
                break;
            }

            let Some(maker) = self.book.best_opposite(order.side) else {
                break;
            };

            // Self-trade prevention: pull the resting order instead of
            // trading against it; its freeze is released by the auto-cancel.
            if maker.user_id == order.user_id {
                self.book.remove(maker.order_id);
                self.publish_delta(
                    maker.side,
                    maker.price,
                    self.book.level_size(maker.side, maker.price),
                    now_ms(),
                );
                auto_cancels.push(maker.order_id);
                continue;
            }

            let crossed = match (order.order_type, order.price) {
                (OrderType::Limit, Some(limit)) => match order.side {
                    OrderSide::Buy => limit >= maker.price,
                    OrderSide::Sell => limit <= maker.price,
                },
                // Market orders always cross while an opposite exists.
                _ => true,
            };
            if !crossed {
                break;
            }

            let match_qty = if is_market_buy {
                self.pair
                    .snap_quantity(affordable_quantity(budget_left, maker.price))
                    .min(maker.remaining())
            } else {
                order.remaining().min(maker.remaining())
            };
            if match_qty <= 0 {
                break;
            }
            // Price-time priority: the resting order sets the price.
            let match_price = maker.price;
            let cost = notional(match_price, match_qty);

            let (buyer_id, seller_id) = match order.side {
                OrderSide::Buy => (order.user_id, maker.user_id),
                OrderSide::Sell => (maker.user_id, order.user_id),
            };
            let trade_now = now_ms();
            let settled = match self
                .assets
                .execute_trade(
                    buyer_id,
                    seller_id,
                    &self.pair.base_asset,
                    &self.pair.quote_asset,
                    cost,
                    match_qty,
                    trade_now,
                )
                .await
            {
                Ok(settled) => settled,
                Err(StoreError::ScriptTimeout { .. }) => false,
                Err(e) => return Err(e.into()),
            };
            if !settled {
                tracing::error!(
                    symbol = %self.pair.symbol,
                    taker = order.id,
                    maker = maker.order_id,
                    "settlement invariant breach, aborting matching pass"
                );
                crate::metrics::record_settlement_failure(&self.pair.symbol);
                settlement_aborted = true;
                break;
            }

            // Taker side of the fill
            order.average_price = weighted_average(
                order.average_price,
                order.filled_quantity,
                match_price,
                match_qty,
            );
            order.filled_quantity += match_qty;
            order.updated_at = trade_now;
            quote_moved += cost;
            if is_market_buy {
                budget_left -= cost;
            }

            // Maker side of the fill
            let Some(mut maker_order) = self.orders.load(maker.order_id).await? else {
                return Err(StoreError::Corrupt {
                    key: keys::order(maker.order_id),
                    detail: "resting order missing from store".to_string(),
                }
                .into());
            };
            maker_order.average_price = weighted_average(
                maker_order.average_price,
                maker_order.filled_quantity,
                match_price,
                match_qty,
            );
            maker_order.filled_quantity += match_qty;
            maker_order.status = if maker_order.remaining() == 0 {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            maker_order.updated_at = trade_now;
            self.orders.save(&maker_order).await?;

            let applied = self.book.apply_fill(maker.order_id, match_qty);
            if maker_order.status == OrderStatus::Filled {
                self.orders.unindex_active(&maker_order).await?;
            }

            // Trade record
            let trade_id = self.trades.next_id().await?;
            let (buy_order_id, sell_order_id) = match order.side {
                OrderSide::Buy => (order.id, maker.order_id),
                OrderSide::Sell => (maker.order_id, order.id),
            };
            let trade = Trade {
                id: trade_id,
                trading_pair_id: self.pair.id,
                symbol: self.pair.symbol.clone(),
                buy_order_id,
                sell_order_id,
                buyer_id,
                seller_id,
                price: match_price,
                quantity: match_qty,
                fee: cost / FEE_DIVISOR,
                fee_asset: self.pair.quote_asset.clone(),
                taker_side: order.side,
                executed_at: trade_now,
            };
            self.trades.save(&trade).await?;
            self.book.set_last_trade_price(match_price);
            self.note_volume(trade_now, match_qty);
            crate::metrics::record_trade_executed(
                &self.pair.symbol,
                from_quanta(cost).to_f64().unwrap_or(0.0),
            );

            // Change records: trade created, maker updated, four balance rows
            self.enqueue_change(
                EntityKind::Trades,
                ChangeRecord::new(trade_id.to_string(), ChangeOp::Create, trade_now),
            )
            .await?;
            self.enqueue_change(
                EntityKind::Orders,
                ChangeRecord::new(maker.order_id.to_string(), ChangeOp::Update, trade_now),
            )
            .await?;
            let (base, quote) = (
                self.pair.base_asset.clone(),
                self.pair.quote_asset.clone(),
            );
            self.asset_changed(buyer_id, &quote, trade_now).await?;
            self.asset_changed(buyer_id, &base, trade_now).await?;
            self.asset_changed(seller_id, &base, trade_now).await?;
            self.asset_changed(seller_id, &quote, trade_now).await?;

            // Market data
            self.publish_tape(&trade);
            if let Some(applied) = applied {
                self.publish_delta(maker.side, match_price, applied.level_size, trade_now);
            }
            self.publish_user_order(&maker_order);
            self.publish_user_trade(&trade, maker_order.user_id);
            self.publish_user_trade(&trade, order.user_id);

            fills.push(Fill {
                trade_id,
                price: match_price,
                quantity: match_qty,
                executed_at: trade_now,
            });
        }

        // 4. Post the remainder (or cancel a market residual)
        let finish = now_ms();
        order.updated_at = finish;

        if settlement_aborted {
            // Leave everything where the failure found it: fills so far
            // stand, the remainder is neither posted nor released.
            order.status = if order.filled_quantity > 0 {
                OrderStatus::PartiallyFilled
            } else {
                OrderStatus::Pending
            };
        } else if order.order_type == OrderType::Limit {
            if order.side == OrderSide::Buy {
                // A buy that crossed below its limit over-froze the
                // difference; return the price improvement.
                let improvement =
                    notional(order.price.unwrap_or(0), order.filled_quantity) - quote_moved;
                if improvement > 0 {
                    self.release(order.user_id, &self.pair.quote_asset.clone(), improvement, finish)
                        .await?;
                }
            }
            if order.remaining() > 0 {
                order.status = if order.filled_quantity > 0 {
                    OrderStatus::PartiallyFilled
                } else {
                    OrderStatus::Active
                };
                let price = order.price.unwrap_or(0);
                self.book.add(BookEntry {
                    order_id: order.id,
                    user_id: order.user_id,
                    side: order.side,
                    price,
                    quantity: order.quantity,
                    filled: order.filled_quantity,
                    created_at: order.created_at,
                });
                self.orders.index_active(&order, price).await?;
                self.publish_delta(
                    order.side,
                    price,
                    self.book.level_size(order.side, price),
                    finish,
                );
            } else {
                order.status = OrderStatus::Filled;
            }
        } else {
            // Market residuals are immediate-or-cancel.
            match order.side {
                OrderSide::Buy => {
                    if budget_left > 0 {
                        self.release(
                            order.user_id,
                            &self.pair.quote_asset.clone(),
                            budget_left,
                            finish,
                        )
                        .await?;
                        order.status = OrderStatus::Cancelled;
                    } else {
                        order.status = OrderStatus::Filled;
                    }
                }
                OrderSide::Sell => {
                    if order.remaining() > 0 {
                        self.release(
                            order.user_id,
                            &self.pair.base_asset.clone(),
                            order.remaining(),
                            finish,
                        )
                        .await?;
                        order.status = OrderStatus::Cancelled;
                    } else {
                        order.status = OrderStatus::Filled;
                    }
                }
            }
        }

        // 5. Persist and emit
        self.orders.save(&order).await?;
        self.orders.index_for_user(&order).await?;
        self.enqueue_change(
            EntityKind::Orders,
            ChangeRecord::new(order.id.to_string(), ChangeOp::Create, finish),
        )
        .await?;
        self.publish_user_order(&order);
        self.publish_ticker(finish);

        for maker_id in auto_cancels {
            match self.handle_cancel(maker_id, None).await {
                Ok(()) => {}
                Err(e @ EngineError::ChangeQueue(_)) | Err(e @ EngineError::Store(_)) => {
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(order_id = maker_id, error = %e, "auto-cancel skipped");
                }
            }
        }

        crate::metrics::record_match_duration(timer.elapsed_secs());
        Ok(OrderAck {
            order_id: order.id,
            status: order.status,
            executed_quantity: order.filled_quantity,
            average_price: order.average_price,
            fills,
            reject_reason: None,
        })
    }

    fn validate(&self, order: &Order) -> Result<(), String> {
        if !self.pair.is_active {
            return Err(format!("trading pair {} is not active", self.pair.symbol));
        }
        if order.quantity <= 0 {
            return Err("quantity must be positive".to_string());
        }
        match order.order_type {
            OrderType::Limit => {
                let price = order
                    .price
                    .ok_or_else(|| "limit order requires a price".to_string())?;
                if !self.pair.valid_price(price) {
                    return Err(format!(
                        "price violates the pair's {}-decimal precision",
                        self.pair.price_precision
                    ));
                }
                if !self.pair.valid_quantity(order.quantity) {
                    return Err("quantity outside the pair's limits or precision".to_string());
                }
            }
            OrderType::Market => {
                if order.price.is_some() {
                    return Err("market order must not carry a price".to_string());
                }
                // A market buy's quantity is a quote budget; only sells are
                // bound by the base quantity limits.
                if order.side == OrderSide::Sell && !self.pair.valid_quantity(order.quantity) {
                    return Err("quantity outside the pair's limits or precision".to_string());
                }
            }
        }
        Ok(())
    }

    fn freeze_terms(&self, order: &Order) -> (String, Quanta) {
        match (order.side, order.order_type) {
            (OrderSide::Buy, OrderType::Limit) => (
                self.pair.quote_asset.clone(),
                notional(order.price.unwrap_or(0), order.quantity),
            ),
            // Market buy freezes the provided quote budget.
            (OrderSide::Buy, OrderType::Market) => {
                (self.pair.quote_asset.clone(), order.quantity)
            }
            (OrderSide::Sell, _) => (self.pair.base_asset.clone(), order.quantity),
        }
    }

    async fn reject(&mut self, mut order: Order, reason: String) -> Result<OrderAck, EngineError> {
        let now = now_ms();
        order.status = OrderStatus::Rejected;
        order.updated_at = now;
        self.orders.save(&order).await?;
        self.orders.index_for_user(&order).await?;
        self.enqueue_change(
            EntityKind::Orders,
            ChangeRecord::new(order.id.to_string(), ChangeOp::Create, now),
        )
        .await?;
        self.publish_user_order(&order);
        tracing::debug!(order_id = order.id, %reason, "order rejected");
        Ok(OrderAck {
            order_id: order.id,
            status: OrderStatus::Rejected,
            executed_quantity: 0,
            average_price: 0,
            fills: Vec::new(),
            reject_reason: Some(reason),
        })
    }

    // ========================================================================
    // Cancel
    // ========================================================================

    async fn handle_cancel(
        &mut self,
        order_id: i64,
        caller: Option<i64>,
    ) -> Result<(), EngineError> {
        let mut order = self
            .orders
            .load(order_id)
            .await?
            .ok_or(EngineError::OrderNotFound(order_id))?;
        if order.symbol != self.pair.symbol {
            return Err(EngineError::OrderNotFound(order_id));
        }
        if let Some(user_id) = caller {
            if order.user_id != user_id {
                return Err(EngineError::NotOrderOwner(order_id));
            }
        }
        if !order.status.is_cancellable() {
            return Err(EngineError::NotCancellable(order_id));
        }

        let now = now_ms();

        // Return the unfilled portion of the freeze.
        let (currency, amount) = match (order.side, order.order_type) {
            (OrderSide::Buy, OrderType::Limit) => (
                self.pair.quote_asset.clone(),
                notional(order.price.unwrap_or(0), order.remaining()),
            ),
            (OrderSide::Sell, _) => (self.pair.base_asset.clone(), order.remaining()),
            // Market orders never rest; nothing is held by the time a
            // cancel could reach them.
            (OrderSide::Buy, OrderType::Market) => (self.pair.quote_asset.clone(), 0),
        };
        if amount > 0 {
            self.release(order.user_id, &currency, amount, now).await?;
        }

        order.status = OrderStatus::Cancelled;
        order.updated_at = now;

        let removed = self.book.remove(order.id);
        self.orders.unindex_active(&order).await?;
        self.orders.save(&order).await?;
        self.enqueue_change(
            EntityKind::Orders,
            ChangeRecord::new(order.id.to_string(), ChangeOp::Update, now),
        )
        .await?;

        if let Some(entry) = removed {
            self.publish_delta(
                entry.side,
                entry.price,
                self.book.level_size(entry.side, entry.price),
                now,
            );
        }
        self.publish_user_order(&order);
        crate::metrics::record_order_cancelled();
        tracing::debug!(order_id, auto = caller.is_none(), "order cancelled");
        Ok(())
    }

    // ========================================================================
    // Shared pieces
    // ========================================================================

    /// Unfreeze plus the bookkeeping that goes with any balance movement.
    async fn release(
        &mut self,
        user_id: i64,
        currency: &str,
        amount: Quanta,
        now: i64,
    ) -> Result<(), EngineError> {
        if !self.assets.unfreeze(user_id, currency, amount, now).await? {
            // Frozen short of what the order accounting says it holds.
            tracing::error!(
                user_id,
                currency,
                amount,
                "unfreeze failed, frozen balance short"
            );
            crate::metrics::record_settlement_failure(&self.pair.symbol);
            return Ok(());
        }
        self.asset_changed(user_id, currency, now).await
    }

    async fn asset_changed(
        &mut self,
        user_id: i64,
        currency: &str,
        now: i64,
    ) -> Result<(), EngineError> {
        self.enqueue_change(
            EntityKind::Assets,
            ChangeRecord::new(format!("{}:{}", user_id, currency), ChangeOp::Update, now),
        )
        .await?;
        if let Ok(asset) = self.assets.load(user_id, currency).await {
            if let Ok(payload) = serde_json::to_value(crate::models::AssetResponse::from(&asset)) {
                self.hub.publish(
                    &keys::group_user(user_id),
                    PushMessage::UserEvent {
                        user_id,
                        kind: "asset".to_string(),
                        payload,
                    },
                );
            }
        }
        Ok(())
    }

    /// A change-queue append failure means the durable store would desync;
    /// the lane halts and health reports it.
    async fn enqueue_change(
        &mut self,
        kind: EntityKind,
        record: ChangeRecord,
    ) -> Result<(), EngineError> {
        if let Err(e) = self.queue.enqueue(kind, &record).await {
            self.halted.store(true, Ordering::Relaxed);
            tracing::error!(
                symbol = %self.pair.symbol,
                %kind,
                error = %e,
                "change queue append failed, halting lane"
            );
            return Err(EngineError::ChangeQueue(e.to_string()));
        }
        Ok(())
    }

    fn depth_snapshot(&self, levels: usize) -> DepthSnapshot {
        DepthSnapshot {
            symbol: self.pair.symbol.clone(),
            bids: self.book.depth(OrderSide::Buy, levels),
            asks: self.book.depth(OrderSide::Sell, levels),
            ts: now_ms(),
        }
    }

    fn note_volume(&mut self, now: i64, quantity: Quanta) {
        self.volume_window.push_back((now, quantity));
        self.volume_total += quantity;
        while let Some(&(ts, qty)) = self.volume_window.front() {
            if now - ts <= VOLUME_WINDOW_MS {
                break;
            }
            self.volume_window.pop_front();
            self.volume_total -= qty;
        }
    }

    fn publish_delta(&self, side: OrderSide, price: Quanta, level_size: Quanta, ts: i64) {
        self.hub.publish(
            &keys::group_orderbook(&self.pair.symbol),
            PushMessage::BookDelta {
                symbol: self.pair.symbol.clone(),
                side,
                price: from_quanta(price),
                new_size: from_quanta(level_size),
                ts,
            },
        );
    }

    fn publish_tape(&self, trade: &Trade) {
        self.hub.publish(
            &keys::group_trades(&self.pair.symbol),
            PushMessage::TradeTape {
                symbol: self.pair.symbol.clone(),
                price: from_quanta(trade.price),
                qty: from_quanta(trade.quantity),
                ts: trade.executed_at,
                taker_side: trade.taker_side,
            },
        );
    }

    fn publish_ticker(&self, ts: i64) {
        let Some(last) = self.book.last_trade_price() else {
            return;
        };
        self.hub.publish(
            &keys::group_ticker(&self.pair.symbol),
            PushMessage::Ticker {
                symbol: self.pair.symbol.clone(),
                last: from_quanta(last),
                vol24h: from_quanta(self.volume_total),
                ts,
            },
        );
    }

    fn publish_user_order(&self, order: &Order) {
        if let Ok(payload) = serde_json::to_value(crate::models::OrderResponse::from(order)) {
            self.hub.publish(
                &keys::group_user(order.user_id),
                PushMessage::UserEvent {
                    user_id: order.user_id,
                    kind: "order".to_string(),
                    payload,
                },
            );
        }
    }

    fn publish_user_trade(&self, trade: &Trade, user_id: i64) {
        if let Ok(payload) = serde_json::to_value(trade) {
            self.hub.publish(
                &keys::group_user(user_id),
                PushMessage::UserEvent {
                    user_id,
                    kind: "trade".to_string(),
                    payload,
                },
            );
        }
    }
}
