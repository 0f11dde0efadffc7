pub mod asset;
pub mod order;
pub mod trade;
pub mod trading_pair;
pub mod units;

pub use asset::{Asset, AssetResponse};
pub use order::{
    CancelOrderResponse, Order, OrderResponse, OrderSide, OrderStatus, OrderType,
    SubmitOrderRequest, SubmitOrderResponse, TradeFill,
};
pub use trade::Trade;
pub use trading_pair::TradingPair;
pub use units::Quanta;
