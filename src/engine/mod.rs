//! Order Matching Engine
//!
//! One serial matching lane per trading pair, each a single-writer task
//! behind a bounded intake channel. Events for a symbol observe a single
//! total order equal to intake order; across symbols there is none.

mod book;
mod lane;
mod types;

pub use book::{BookEntry, FillApplied, OrderBook};
pub use types::{
    DepthLevel, DepthSnapshot, EngineError, Fill, LaneCommand, LaneEvent, NewOrder, OrderAck,
};

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::models::TradingPair;
use crate::publisher::PublisherHub;
use crate::store::{OperationalStore, OrderStore};

use lane::Lane;

/// Intake channel capacity per lane.
pub const INTAKE_CAPACITY: usize = 10_000;

/// Default per-event intake deadline.
pub const DEFAULT_INTAKE_DEADLINE: Duration = Duration::from_secs(2);

struct LaneHandle {
    tx: mpsc::Sender<LaneEvent>,
    heartbeat: Arc<AtomicI64>,
    halted: Arc<AtomicBool>,
}

/// Point-in-time lane health, consumed by the readiness probe.
#[derive(Debug, Clone)]
pub struct LaneStatus {
    pub symbol: String,
    pub last_heartbeat_ms: i64,
    pub halted: bool,
}

pub struct MatchingEngine<S> {
    store: Arc<S>,
    hub: Arc<PublisherHub>,
    lanes: DashMap<String, LaneHandle>,
    pairs: DashMap<String, TradingPair>,
    intake_deadline: Duration,
}

impl<S: OperationalStore> MatchingEngine<S> {
    /// Spawn one lane per pair, rebuilding each book from the active-order
    /// index first.
    pub async fn start(
        store: Arc<S>,
        hub: Arc<PublisherHub>,
        pairs: Vec<TradingPair>,
        intake_deadline: Duration,
    ) -> Result<Arc<Self>, EngineError> {
        let engine = Self {
            store,
            hub,
            lanes: DashMap::new(),
            pairs: DashMap::new(),
            intake_deadline,
        };
        for pair in pairs {
            engine.spawn_lane(pair).await?;
        }
        Ok(Arc::new(engine))
    }

    async fn spawn_lane(&self, pair: TradingPair) -> Result<(), EngineError> {
        let symbol = pair.symbol.clone();
        let (tx, rx) = mpsc::channel(INTAKE_CAPACITY);
        let heartbeat = Arc::new(AtomicI64::new(chrono::Utc::now().timestamp_millis()));
        let halted = Arc::new(AtomicBool::new(false));

        let mut lane = Lane::new(
            pair.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.hub),
            Arc::clone(&heartbeat),
            Arc::clone(&halted),
        );
        let recovered = lane.bootstrap().await?;
        if recovered > 0 {
            tracing::info!(%symbol, recovered, "recovered resting orders into the book");
        }
        tokio::spawn(lane.run(rx));

        self.pairs.insert(symbol.clone(), pair);
        self.lanes.insert(
            symbol.clone(),
            LaneHandle {
                tx,
                heartbeat,
                halted,
            },
        );
        tracing::info!(%symbol, "matching lane started");
        Ok(())
    }

    fn lane_tx(&self, symbol: &str) -> Result<mpsc::Sender<LaneEvent>, EngineError> {
        self.lanes
            .get(symbol)
            .map(|handle| handle.tx.clone())
            .ok_or_else(|| EngineError::SymbolNotFound(symbol.to_string()))
    }

    /// Submit an order to its symbol's lane and wait for the outcome.
    pub async fn submit(&self, order: NewOrder) -> Result<OrderAck, EngineError> {
        let tx = self.lane_tx(&order.symbol)?;
        let (reply, rx) = oneshot::channel();
        let event = LaneEvent {
            deadline: Instant::now() + self.intake_deadline,
            command: LaneCommand::Place { order, reply },
        };
        tx.send(event)
            .await
            .map_err(|_| EngineError::LaneUnavailable)?;
        rx.await.map_err(|_| EngineError::LaneUnavailable)?
    }

    /// Cancel an order. `caller` is `None` only for operator/auto paths.
    pub async fn cancel(&self, order_id: i64, caller: Option<i64>) -> Result<(), EngineError> {
        // Orders carry their symbol; route the cancel to the owning lane.
        let orders = OrderStore::new(Arc::clone(&self.store));
        let order = orders
            .load(order_id)
            .await?
            .ok_or(EngineError::OrderNotFound(order_id))?;

        let tx = self.lane_tx(&order.symbol)?;
        let (reply, rx) = oneshot::channel();
        let event = LaneEvent {
            deadline: Instant::now() + self.intake_deadline,
            command: LaneCommand::Cancel {
                order_id,
                caller,
                reply,
            },
        };
        tx.send(event)
            .await
            .map_err(|_| EngineError::LaneUnavailable)?;
        rx.await.map_err(|_| EngineError::LaneUnavailable)?
    }

    /// Aggregated depth, served by the lane so it sees a consistent book.
    pub async fn depth(&self, symbol: &str, levels: usize) -> Result<DepthSnapshot, EngineError> {
        let tx = self.lane_tx(symbol)?;
        let (reply, rx) = oneshot::channel();
        let event = LaneEvent {
            deadline: Instant::now() + self.intake_deadline,
            command: LaneCommand::Depth { levels, reply },
        };
        tx.send(event)
            .await
            .map_err(|_| EngineError::LaneUnavailable)?;
        rx.await.map_err(|_| EngineError::LaneUnavailable)?
    }

    pub fn pair(&self, symbol: &str) -> Option<TradingPair> {
        self.pairs.get(symbol).map(|p| p.value().clone())
    }

    pub fn symbols(&self) -> Vec<String> {
        self.pairs.iter().map(|p| p.key().clone()).collect()
    }

    /// Lane heartbeats and halt flags for the readiness probe.
    pub fn lane_statuses(&self) -> Vec<LaneStatus> {
        self.lanes
            .iter()
            .map(|entry| LaneStatus {
                symbol: entry.key().clone(),
                last_heartbeat_ms: entry.heartbeat.load(Ordering::Relaxed),
                halted: entry.halted.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// True when every lane has heartbeated within `stale_after` and none
    /// has halted.
    pub fn all_lanes_running(&self, stale_after: Duration) -> bool {
        let cutoff = chrono::Utc::now().timestamp_millis() - stale_after.as_millis() as i64;
        self.lanes.iter().all(|entry| {
            !entry.halted.load(Ordering::Relaxed)
                && entry.heartbeat.load(Ordering::Relaxed) >= cutoff
        })
    }
}
