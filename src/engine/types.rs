//! Matching engine types.

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::models::units::Quanta;
use crate::models::{OrderSide, OrderStatus, OrderType};
use crate::store::StoreError;

/// Matching engine errors. The first four kinds are user-surfaced; the rest
/// are operational and reach callers only as refusals.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown symbol: {0}")]
    SymbolNotFound(String),

    #[error("trading pair {0} is not active")]
    PairInactive(String),

    #[error("invalid order: {0}")]
    Validation(String),

    #[error("insufficient {currency} balance")]
    InsufficientFunds { currency: String },

    #[error("order not found: {0}")]
    OrderNotFound(i64),

    #[error("order {0} does not belong to the caller")]
    NotOrderOwner(i64),

    #[error("order {0} is not cancellable in its current status")]
    NotCancellable(i64),

    #[error("intake deadline exceeded")]
    IntakeExpired,

    #[error("matching lane unavailable")]
    LaneUnavailable,

    #[error("change queue append failed: {0}")]
    ChangeQueue(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A validated submission, amounts already converted to quanta.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// For a market buy this is the quote-currency budget.
    pub quantity: Quanta,
    pub price: Option<Quanta>,
}

/// One fill produced while processing a taker order.
#[derive(Debug, Clone)]
pub struct Fill {
    pub trade_id: i64,
    pub price: Quanta,
    pub quantity: Quanta,
    pub executed_at: i64,
}

/// Outcome handed back to the submitter.
#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: i64,
    pub status: OrderStatus,
    pub executed_quantity: Quanta,
    pub average_price: Quanta,
    pub fills: Vec<Fill>,
    /// Populated when `status` is `Rejected`.
    pub reject_reason: Option<String>,
}

/// Aggregated price level for depth queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthLevel {
    pub price: Quanta,
    pub quantity: Quanta,
}

#[derive(Debug, Clone)]
pub struct DepthSnapshot {
    pub symbol: String,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub ts: i64,
}

/// Commands consumed by a lane, FIFO. Depth rides the same channel so the
/// book needs no lock.
pub enum LaneCommand {
    Place {
        order: NewOrder,
        reply: oneshot::Sender<Result<OrderAck, EngineError>>,
    },
    Cancel {
        order_id: i64,
        /// `None` for lane-initiated (auto) cancels.
        caller: Option<i64>,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Depth {
        levels: usize,
        reply: oneshot::Sender<Result<DepthSnapshot, EngineError>>,
    },
}

/// Intake envelope. Events that cannot start before `deadline` are
/// rejected back to the submitter.
pub struct LaneEvent {
    pub deadline: Instant,
    pub command: LaneCommand,
}
