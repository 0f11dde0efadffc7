//! Price-time-priority order book.
//!
//! A sorted map from price to a FIFO queue per side, plus an id index for
//! O(1)-ish removal. Each book is owned exclusively by its matching lane,
//! so no interior locking is needed.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::models::units::Quanta;
use crate::models::OrderSide;

use super::types::DepthLevel;

/// A resting order. Only Active/PartiallyFilled limit orders rest.
#[derive(Debug, Clone)]
pub struct BookEntry {
    pub order_id: i64,
    pub user_id: i64,
    pub side: OrderSide,
    pub price: Quanta,
    pub quantity: Quanta,
    pub filled: Quanta,
    pub created_at: i64,
}

impl BookEntry {
    pub fn remaining(&self) -> Quanta {
        self.quantity - self.filled
    }
}

/// Result of applying a fill to a resting order.
#[derive(Debug, Clone, Copy)]
pub struct FillApplied {
    /// The maker was fully filled and left the book.
    pub maker_removed: bool,
    /// Aggregate remaining size of the maker's price level after the fill.
    pub level_size: Quanta,
}

pub struct OrderBook {
    symbol: String,
    /// Bids iterate descending (highest first), asks ascending.
    bids: BTreeMap<Quanta, VecDeque<BookEntry>>,
    asks: BTreeMap<Quanta, VecDeque<BookEntry>>,
    /// order id -> (side, price) for removal without scanning.
    index: HashMap<i64, (OrderSide, Quanta)>,
    last_trade_price: Option<Quanta>,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
            last_trade_price: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn last_trade_price(&self) -> Option<Quanta> {
        self.last_trade_price
    }

    pub fn set_last_trade_price(&mut self, price: Quanta) {
        self.last_trade_price = Some(price);
    }

    pub fn best_bid(&self) -> Option<Quanta> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<Quanta> {
        self.asks.keys().next().copied()
    }

    pub fn spread(&self) -> Option<Quanta> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    fn side_mut(&mut self, side: OrderSide) -> &mut BTreeMap<Quanta, VecDeque<BookEntry>> {
        match side {
            OrderSide::Buy => &mut self.bids,
            OrderSide::Sell => &mut self.asks,
        }
    }

    fn side_ref(&self, side: OrderSide) -> &BTreeMap<Quanta, VecDeque<BookEntry>> {
        match side {
            OrderSide::Buy => &self.bids,
            OrderSide::Sell => &self.asks,
        }
    }

    /// Insert at the tail of the entry's price level.
    pub fn add(&mut self, entry: BookEntry) {
        debug_assert!(entry.remaining() > 0);
        let (side, price, order_id) = (entry.side, entry.price, entry.order_id);
        self.side_mut(side)
            .entry(price)
            .or_insert_with(VecDeque::new)
            .push_back(entry);
        self.index.insert(order_id, (side, price));
    }

    /// Remove by id, dropping the level if it empties.
    pub fn remove(&mut self, order_id: i64) -> Option<BookEntry> {
        let (side, price) = self.index.remove(&order_id)?;
        let book = self.side_mut(side);
        let queue = book.get_mut(&price)?;
        let pos = queue.iter().position(|e| e.order_id == order_id)?;
        let entry = queue.remove(pos);
        if queue.is_empty() {
            book.remove(&price);
        }
        entry
    }

    /// Peek the first still-live order opposite the taker's side, lazily
    /// discarding fully-filled head entries.
    pub fn best_opposite(&mut self, taker_side: OrderSide) -> Option<BookEntry> {
        let side = taker_side.opposite();
        loop {
            let (book, price) = match side {
                OrderSide::Buy => {
                    let price = *self.bids.keys().next_back()?;
                    (&mut self.bids, price)
                }
                OrderSide::Sell => {
                    let price = *self.asks.keys().next()?;
                    (&mut self.asks, price)
                }
            };
            let queue = book.get_mut(&price)?;
            match queue.front() {
                Some(head) if head.remaining() > 0 => return Some(head.clone()),
                Some(head) => {
                    let stale_id = head.order_id;
                    queue.pop_front();
                    self.index.remove(&stale_id);
                    if book.get(&price).map_or(false, |q| q.is_empty()) {
                        book.remove(&price);
                    }
                }
                None => {
                    book.remove(&price);
                }
            }
        }
    }

    /// Apply a fill to a resting order, removing it when fully filled.
    pub fn apply_fill(&mut self, order_id: i64, quantity: Quanta) -> Option<FillApplied> {
        let (side, price) = *self.index.get(&order_id)?;
        let book = match side {
            OrderSide::Buy => &mut self.bids,
            OrderSide::Sell => &mut self.asks,
        };
        let queue = book.get_mut(&price)?;
        let pos = queue.iter().position(|e| e.order_id == order_id)?;
        let entry = &mut queue[pos];
        entry.filled += quantity;
        debug_assert!(entry.filled <= entry.quantity);

        let removed = entry.remaining() == 0;
        if removed {
            queue.remove(pos);
            self.index.remove(&order_id);
        }
        let queue = book.get_mut(&price)?;
        let level_size: Quanta = queue.iter().map(|e| e.remaining()).sum();
        if queue.is_empty() {
            book.remove(&price);
        }
        Some(FillApplied {
            maker_removed: removed,
            level_size,
        })
    }

    /// Aggregate remaining size at one price level; 0 when absent.
    pub fn level_size(&self, side: OrderSide, price: Quanta) -> Quanta {
        self.side_ref(side)
            .get(&price)
            .map(|q| q.iter().map(|e| e.remaining()).sum())
            .unwrap_or(0)
    }

    /// First `n` non-empty price levels, best first.
    pub fn depth(&self, side: OrderSide, n: usize) -> Vec<DepthLevel> {
        fn level((price, queue): (&Quanta, &VecDeque<BookEntry>)) -> DepthLevel {
            DepthLevel {
                price: *price,
                quantity: queue.iter().map(|e| e.remaining()).sum(),
            }
        }
        match side {
            OrderSide::Buy => self.bids.iter().rev().take(n).map(level).collect(),
            OrderSide::Sell => self.asks.iter().take(n).map(level).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(order_id: i64, user_id: i64, side: OrderSide, price: Quanta, qty: Quanta) -> BookEntry {
        BookEntry {
            order_id,
            user_id,
            side,
            price,
            quantity: qty,
            filled: 0,
            created_at: order_id,
        }
    }

    #[test]
    fn test_add_and_remove() {
        let mut book = OrderBook::new("BTCUSDT");
        book.add(entry(1, 10, OrderSide::Buy, 100, 5));
        assert_eq!(book.len(), 1);
        assert_eq!(book.best_bid(), Some(100));

        let removed = book.remove(1).unwrap();
        assert_eq!(removed.order_id, 1);
        assert!(book.is_empty());
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn test_best_bid_ask_and_spread() {
        let mut book = OrderBook::new("BTCUSDT");
        book.add(entry(1, 10, OrderSide::Buy, 100, 1));
        book.add(entry(2, 10, OrderSide::Buy, 101, 1));
        book.add(entry(3, 11, OrderSide::Sell, 102, 1));
        book.add(entry(4, 11, OrderSide::Sell, 103, 1));

        assert_eq!(book.best_bid(), Some(101));
        assert_eq!(book.best_ask(), Some(102));
        assert_eq!(book.spread(), Some(1));
    }

    #[test]
    fn test_fifo_within_level() {
        let mut book = OrderBook::new("BTCUSDT");
        book.add(entry(1, 10, OrderSide::Sell, 100, 5));
        book.add(entry(2, 11, OrderSide::Sell, 100, 5));

        let best = book.best_opposite(OrderSide::Buy).unwrap();
        assert_eq!(best.order_id, 1, "earliest order at the level matches first");

        let applied = book.apply_fill(1, 5).unwrap();
        assert!(applied.maker_removed);
        assert_eq!(applied.level_size, 5);

        let next = book.best_opposite(OrderSide::Buy).unwrap();
        assert_eq!(next.order_id, 2);
    }

    #[test]
    fn test_partial_fill_keeps_entry() {
        let mut book = OrderBook::new("BTCUSDT");
        book.add(entry(1, 10, OrderSide::Sell, 100, 200));

        let applied = book.apply_fill(1, 30).unwrap();
        assert!(!applied.maker_removed);
        assert_eq!(applied.level_size, 170);
        assert_eq!(book.best_opposite(OrderSide::Buy).unwrap().remaining(), 170);
    }

    #[test]
    fn test_depth_aggregates_levels() {
        let mut book = OrderBook::new("BTCUSDT");
        book.add(entry(1, 10, OrderSide::Buy, 100, 1));
        book.add(entry(2, 11, OrderSide::Buy, 100, 2));
        book.add(entry(3, 12, OrderSide::Buy, 99, 4));
        book.add(entry(4, 13, OrderSide::Sell, 102, 8));

        let bids = book.depth(OrderSide::Buy, 10);
        assert_eq!(
            bids,
            vec![
                DepthLevel { price: 100, quantity: 3 },
                DepthLevel { price: 99, quantity: 4 },
            ]
        );
        let asks = book.depth(OrderSide::Sell, 1);
        assert_eq!(asks, vec![DepthLevel { price: 102, quantity: 8 }]);
    }

    #[test]
    fn test_level_dropped_when_emptied() {
        let mut book = OrderBook::new("BTCUSDT");
        book.add(entry(1, 10, OrderSide::Sell, 100, 5));
        book.add(entry(2, 11, OrderSide::Sell, 101, 5));

        book.apply_fill(1, 5).unwrap();
        assert_eq!(book.best_ask(), Some(101));
        assert_eq!(book.level_size(OrderSide::Sell, 100), 0);
    }

    #[test]
    fn test_best_opposite_empty_book() {
        let mut book = OrderBook::new("BTCUSDT");
        assert!(book.best_opposite(OrderSide::Buy).is_none());
        assert!(book.best_opposite(OrderSide::Sell).is_none());
    }
}
