//! End-to-end matching scenarios over the in-memory store.

mod common;

use common::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use spot_core::engine::EngineError;
use spot_core::models::units::from_quanta;
use spot_core::models::{OrderSide, OrderStatus};
use spot_core::publisher::PushMessage;

#[tokio::test]
async fn test_basic_cross() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(100000)).await;
    h.fund(2, BTC, dec!(1)).await;

    let sell = h.limit(2, OrderSide::Sell, dec!(1), dec!(50000)).await;
    assert_eq!(sell.status, OrderStatus::Active);

    let buy = h.limit(1, OrderSide::Buy, dec!(1), dec!(51000)).await;
    assert_eq!(buy.status, OrderStatus::Filled);
    assert_eq!(buy.fills.len(), 1);
    assert_eq!(from_quanta(buy.fills[0].price), dec!(50000));
    assert_eq!(from_quanta(buy.fills[0].quantity), dec!(1));

    // Resting order set the price; the taker's 51000 freeze came back.
    assert_eq!(h.balances(1, BTC).await, (dec!(1), dec!(0)));
    assert_eq!(h.balances(1, USDT).await, (dec!(50000), dec!(0)));
    assert_eq!(h.balances(2, BTC).await, (dec!(0), dec!(0)));
    assert_eq!(h.balances(2, USDT).await, (dec!(50000), dec!(0)));

    assert_eq!(h.order(sell.order_id).await.status, OrderStatus::Filled);
    assert_eq!(h.order(buy.order_id).await.status, OrderStatus::Filled);

    // No creation or destruction of funds.
    assert_eq!(h.total_holdings(USDT, &[1, 2]).await, dec!(100000));
    assert_eq!(h.total_holdings(BTC, &[1, 2]).await, dec!(1));
}

#[tokio::test]
async fn test_partial_fill_leaves_maker_on_book() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(100000)).await;
    h.fund(2, BTC, dec!(2)).await;

    let sell = h.limit(2, OrderSide::Sell, dec!(2), dec!(50000)).await;
    let buy = h.limit(1, OrderSide::Buy, dec!(0.3), dec!(50000)).await;

    assert_eq!(buy.status, OrderStatus::Filled);
    assert_eq!(buy.fills.len(), 1);
    assert_eq!(from_quanta(buy.fills[0].quantity), dec!(0.3));

    let maker = h.order(sell.order_id).await;
    assert_eq!(maker.status, OrderStatus::PartiallyFilled);
    assert_eq!(from_quanta(maker.filled_quantity), dec!(0.3));

    assert_eq!(h.depth(OrderSide::Buy, 10).await, vec![]);
    assert_eq!(
        h.depth(OrderSide::Sell, 10).await,
        vec![(dec!(50000), dec!(1.7))]
    );
}

#[tokio::test]
async fn test_self_trade_prevention_auto_cancels_maker() {
    let h = Harness::new().await;
    h.fund(3, BTC, dec!(1)).await;
    h.fund(3, USDT, dec!(60000)).await;

    let sell = h.limit(3, OrderSide::Sell, dec!(1), dec!(50000)).await;
    assert_eq!(h.balances(3, BTC).await, (dec!(0), dec!(1)));

    let buy = h.limit(3, OrderSide::Buy, dec!(1), dec!(51000)).await;
    // No trade; the resting sell was pulled and its freeze released.
    assert!(buy.fills.is_empty());
    assert_eq!(h.order(sell.order_id).await.status, OrderStatus::Cancelled);
    assert_eq!(h.balances(3, BTC).await, (dec!(1), dec!(0)));

    // The new buy rests with its own freeze.
    assert_eq!(buy.status, OrderStatus::Active);
    assert_eq!(h.balances(3, USDT).await, (dec!(9000), dec!(51000)));
    assert_eq!(
        h.depth(OrderSide::Buy, 10).await,
        vec![(dec!(51000), dec!(1))]
    );
}

#[tokio::test]
async fn test_insufficient_funds_rejects_without_side_effects() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(10)).await;

    let ack = h.limit(1, OrderSide::Buy, dec!(1), dec!(50000)).await;
    assert_eq!(ack.status, OrderStatus::Rejected);
    assert!(ack.reject_reason.unwrap().contains("insufficient"));

    assert_eq!(h.balances(1, USDT).await, (dec!(10), dec!(0)));
    let stored = h.order(ack.order_id).await;
    assert_eq!(stored.status, OrderStatus::Rejected);
}

#[tokio::test]
async fn test_cancel_after_partial_fill() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(100000)).await;
    h.fund(2, BTC, dec!(2)).await;

    let sell = h.limit(2, OrderSide::Sell, dec!(2), dec!(50000)).await;
    h.limit(1, OrderSide::Buy, dec!(0.3), dec!(50000)).await;

    h.engine.cancel(sell.order_id, Some(2)).await.unwrap();

    assert_eq!(h.order(sell.order_id).await.status, OrderStatus::Cancelled);
    assert_eq!(h.balances(2, BTC).await, (dec!(1.7), dec!(0)));
    assert_eq!(h.depth(OrderSide::Sell, 10).await, vec![]);
}

#[tokio::test]
async fn test_place_cancel_round_trip_leaves_balances_unchanged() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(100000)).await;

    let ack = h.limit(1, OrderSide::Buy, dec!(1), dec!(40000)).await;
    assert_eq!(ack.status, OrderStatus::Active);
    assert_eq!(h.balances(1, USDT).await, (dec!(60000), dec!(40000)));

    h.engine.cancel(ack.order_id, Some(1)).await.unwrap();
    assert_eq!(h.balances(1, USDT).await, (dec!(100000), dec!(0)));
}

#[tokio::test]
async fn test_limit_buy_at_exact_best_ask_crosses() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(50000)).await;
    h.fund(2, BTC, dec!(1)).await;

    h.limit(2, OrderSide::Sell, dec!(1), dec!(50000)).await;
    let buy = h.limit(1, OrderSide::Buy, dec!(1), dec!(50000)).await;
    assert_eq!(buy.status, OrderStatus::Filled);
}

#[tokio::test]
async fn test_limit_sell_at_exact_best_bid_crosses() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(50000)).await;
    h.fund(2, BTC, dec!(1)).await;

    h.limit(1, OrderSide::Buy, dec!(1), dec!(50000)).await;
    let sell = h.limit(2, OrderSide::Sell, dec!(1), dec!(50000)).await;
    assert_eq!(sell.status, OrderStatus::Filled);
}

#[tokio::test]
async fn test_non_crossing_orders_rest_without_overlap() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(100000)).await;
    h.fund(2, BTC, dec!(1)).await;

    let buy = h.limit(1, OrderSide::Buy, dec!(1), dec!(49000)).await;
    let sell = h.limit(2, OrderSide::Sell, dec!(1), dec!(50000)).await;
    assert_eq!(buy.status, OrderStatus::Active);
    assert_eq!(sell.status, OrderStatus::Active);

    // best_bid < best_ask after the pass
    let bids = h.depth(OrderSide::Buy, 1).await;
    let asks = h.depth(OrderSide::Sell, 1).await;
    assert!(bids[0].0 < asks[0].0);
}

#[tokio::test]
async fn test_market_order_on_empty_book_cancels() {
    let h = Harness::new().await;
    h.fund(1, BTC, dec!(1)).await;

    let ack = h.market(1, OrderSide::Sell, dec!(1)).await;
    assert_eq!(ack.status, OrderStatus::Cancelled);
    assert!(ack.fills.is_empty());
    assert_eq!(h.balances(1, BTC).await, (dec!(1), dec!(0)));
}

#[tokio::test]
async fn test_market_buy_spends_quote_budget() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(15000)).await;
    h.fund(2, BTC, dec!(2)).await;

    h.limit(2, OrderSide::Sell, dec!(2), dec!(50000)).await;
    // quantity of a market buy is the quote budget
    let ack = h.market(1, OrderSide::Buy, dec!(15000)).await;

    assert_eq!(ack.status, OrderStatus::Filled);
    assert_eq!(from_quanta(ack.executed_quantity), dec!(0.3));
    assert_eq!(h.balances(1, BTC).await, (dec!(0.3), dec!(0)));
    assert_eq!(h.balances(1, USDT).await, (dec!(0), dec!(0)));
    assert_eq!(h.balances(2, USDT).await, (dec!(15000), dec!(0)));
}

#[tokio::test]
async fn test_market_sell_residual_is_cancelled() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(50000)).await;
    h.fund(2, BTC, dec!(2)).await;

    h.limit(1, OrderSide::Buy, dec!(1), dec!(50000)).await;
    let ack = h.market(2, OrderSide::Sell, dec!(2)).await;

    // 1 BTC crossed, the residual 1 BTC was cancelled back to available
    assert_eq!(ack.status, OrderStatus::Cancelled);
    assert_eq!(from_quanta(ack.executed_quantity), dec!(1));
    assert_eq!(h.balances(2, BTC).await, (dec!(1), dec!(0)));
    assert_eq!(h.balances(2, USDT).await, (dec!(50000), dec!(0)));
}

#[tokio::test]
async fn test_price_time_priority_within_level() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(50000)).await;
    h.fund(2, BTC, dec!(1)).await;
    h.fund(3, BTC, dec!(1)).await;

    let first = h.limit(2, OrderSide::Sell, dec!(1), dec!(50000)).await;
    let second = h.limit(3, OrderSide::Sell, dec!(1), dec!(50000)).await;

    h.limit(1, OrderSide::Buy, dec!(1), dec!(50000)).await;

    assert_eq!(h.order(first.order_id).await.status, OrderStatus::Filled);
    assert_eq!(h.order(second.order_id).await.status, OrderStatus::Active);
}

#[tokio::test]
async fn test_multi_level_fill_average_price_and_improvement_refund() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(400000)).await;
    h.fund(2, BTC, dec!(2)).await;

    h.limit(2, OrderSide::Sell, dec!(1), dec!(100)).await;
    h.limit(2, OrderSide::Sell, dec!(1), dec!(200)).await;

    let buy = h.limit(1, OrderSide::Buy, dec!(2), dec!(250)).await;
    assert_eq!(buy.status, OrderStatus::Filled);
    assert_eq!(buy.fills.len(), 2);

    // value-weighted average over fills at 100 and 200
    assert_eq!(from_quanta(buy.average_price), dec!(150));

    // sum of trade quantities equals the order's filled quantity,
    // and avg * filled equals the notional actually paid
    let filled: Decimal = buy
        .fills
        .iter()
        .map(|f| from_quanta(f.quantity))
        .sum();
    assert_eq!(filled, from_quanta(buy.executed_quantity));
    let paid: Decimal = buy
        .fills
        .iter()
        .map(|f| from_quanta(f.price) * from_quanta(f.quantity))
        .sum();
    assert_eq!(
        from_quanta(buy.average_price) * filled,
        paid
    );

    // froze 2 x 250 = 500, paid 300: the improvement came back
    assert_eq!(h.balances(1, USDT).await, (dec!(399700), dec!(0)));
}

#[tokio::test]
async fn test_excess_price_precision_is_rejected() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(100000)).await;

    // 3 decimals on a 2-decimal pair
    let ack = h.limit(1, OrderSide::Buy, dec!(1), dec!(50000.125)).await;
    assert_eq!(ack.status, OrderStatus::Rejected);
    assert_eq!(h.balances(1, USDT).await, (dec!(100000), dec!(0)));
}

#[tokio::test]
async fn test_cancel_requires_ownership() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(100000)).await;

    let ack = h.limit(1, OrderSide::Buy, dec!(1), dec!(40000)).await;
    let denied = h.engine.cancel(ack.order_id, Some(99)).await;
    assert!(matches!(denied, Err(EngineError::NotOrderOwner(_))));

    // still resting
    assert_eq!(h.order(ack.order_id).await.status, OrderStatus::Active);
}

#[tokio::test]
async fn test_cancel_terminal_order_fails() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(50000)).await;
    h.fund(2, BTC, dec!(1)).await;

    h.limit(2, OrderSide::Sell, dec!(1), dec!(50000)).await;
    let buy = h.limit(1, OrderSide::Buy, dec!(1), dec!(50000)).await;
    assert_eq!(buy.status, OrderStatus::Filled);

    let denied = h.engine.cancel(buy.order_id, Some(1)).await;
    assert!(matches!(denied, Err(EngineError::NotCancellable(_))));
}

#[tokio::test]
async fn test_unknown_symbol_is_refused() {
    let h = Harness::new().await;
    let result = h
        .engine
        .submit(spot_core::engine::NewOrder {
            user_id: 1,
            symbol: "DOGEUSDT".to_string(),
            side: OrderSide::Buy,
            order_type: spot_core::models::OrderType::Limit,
            quantity: 100,
            price: Some(100),
        })
        .await;
    assert!(matches!(result, Err(EngineError::SymbolNotFound(_))));
}

#[tokio::test]
async fn test_market_data_published_on_cross() {
    let h = Harness::new().await;
    let tape = h.hub.subscribe("trades:BTCUSDT");
    let book = h.hub.subscribe("orderbook:BTCUSDT");
    let ticker = h.hub.subscribe("ticker:BTCUSDT");

    h.fund(1, USDT, dec!(50000)).await;
    h.fund(2, BTC, dec!(1)).await;

    h.limit(2, OrderSide::Sell, dec!(1), dec!(50000)).await;
    h.limit(1, OrderSide::Buy, dec!(1), dec!(50000)).await;

    match tape.try_recv().expect("tape event") {
        PushMessage::TradeTape {
            price,
            qty,
            taker_side,
            ..
        } => {
            assert_eq!(price, dec!(50000));
            assert_eq!(qty, dec!(1));
            assert_eq!(taker_side, OrderSide::Buy);
        }
        other => panic!("unexpected message: {:?}", other),
    }

    // posting the sell produced a level, the fill emptied it
    match book.try_recv().expect("post delta") {
        PushMessage::BookDelta {
            side,
            price,
            new_size,
            ..
        } => {
            assert_eq!(side, OrderSide::Sell);
            assert_eq!(price, dec!(50000));
            assert_eq!(new_size, dec!(1));
        }
        other => panic!("unexpected message: {:?}", other),
    }
    match book.try_recv().expect("fill delta") {
        PushMessage::BookDelta { new_size, .. } => assert_eq!(new_size, dec!(0)),
        other => panic!("unexpected message: {:?}", other),
    }

    match ticker.try_recv().expect("ticker") {
        PushMessage::Ticker { last, vol24h, .. } => {
            assert_eq!(last, dec!(50000));
            assert_eq!(vol24h, dec!(1));
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[tokio::test]
async fn test_funds_conserved_across_busy_tape() {
    let h = Harness::new().await;
    h.fund(1, USDT, dec!(1000000)).await;
    h.fund(2, BTC, dec!(10)).await;
    h.fund(3, USDT, dec!(500000)).await;
    h.fund(3, BTC, dec!(5)).await;

    h.limit(2, OrderSide::Sell, dec!(2), dec!(50000)).await;
    h.limit(3, OrderSide::Sell, dec!(1), dec!(50100)).await;
    h.limit(1, OrderSide::Buy, dec!(2.5), dec!(50100)).await;
    h.limit(3, OrderSide::Buy, dec!(0.5), dec!(49000)).await;
    h.market(2, OrderSide::Sell, dec!(0.5)).await;

    assert_eq!(h.total_holdings(USDT, &[1, 2, 3]).await, dec!(1500000));
    assert_eq!(h.total_holdings(BTC, &[1, 2, 3]).await, dec!(15));
}
