//! Order and market-data API handlers.
//!
//! Thin adapters over the matching engine. Authentication lives at the
//! gateway; the caller's user id arrives in the `X-User-Id` header.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::engine::{DepthSnapshot, NewOrder};
use crate::models::units::{from_quanta, to_quanta};
use crate::models::{
    CancelOrderResponse, OrderStatus, SubmitOrderRequest, SubmitOrderResponse, TradeFill,
};
use crate::utils::response::{ApiResponse, AppError};
use crate::AppState;

const MAX_DEPTH: usize = 100;
const DEFAULT_DEPTH: usize = 20;

fn caller_user_id(headers: &HeaderMap) -> Result<i64, AppError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| AppError::unauthorized("missing or invalid X-User-Id header"))
}

/// Create a new order
/// POST /orders
pub async fn submit_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SubmitOrderRequest>,
) -> Result<Json<ApiResponse<SubmitOrderResponse>>, AppError> {
    let user_id = caller_user_id(&headers)?;

    if state.engine.pair(&req.symbol).is_none() {
        return Err(AppError::bad_request(
            "INVALID_SYMBOL",
            &format!("unsupported trading pair: {}", req.symbol),
        ));
    }

    let quantity = to_quanta(req.quantity)
        .map_err(|e| AppError::bad_request("INVALID_QUANTITY", &e.to_string()))?;
    let price = req
        .price
        .map(to_quanta)
        .transpose()
        .map_err(|e| AppError::bad_request("INVALID_PRICE", &e.to_string()))?;

    let ack = state
        .engine
        .submit(NewOrder {
            user_id,
            symbol: req.symbol.clone(),
            side: req.side,
            order_type: req.order_type,
            quantity,
            price,
        })
        .await?;

    // User-surfaced rejections come back synchronously as 4xx.
    if ack.status == OrderStatus::Rejected {
        let reason = ack
            .reject_reason
            .unwrap_or_else(|| "order rejected".to_string());
        let code = if reason.starts_with("insufficient") {
            "INSUFFICIENT_FUNDS"
        } else {
            "VALIDATION"
        };
        return Err(AppError::bad_request(code, &reason));
    }

    Ok(Json(ApiResponse::success(SubmitOrderResponse {
        order_id: ack.order_id,
        status: ack.status,
        executed_quantity: from_quanta(ack.executed_quantity),
        trades: ack
            .fills
            .iter()
            .map(|fill| TradeFill {
                id: fill.trade_id,
                price: from_quanta(fill.price),
                quantity: from_quanta(fill.quantity),
                executed_at: fill.executed_at,
            })
            .collect(),
    })))
}

/// Cancel an order
/// DELETE /orders/:order_id
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(order_id): Path<i64>,
) -> Result<Json<ApiResponse<CancelOrderResponse>>, AppError> {
    let user_id = caller_user_id(&headers)?;

    match state.engine.cancel(order_id, Some(user_id)).await {
        Ok(()) => Ok(Json(ApiResponse::success(CancelOrderResponse {
            success: true,
            reason: None,
        }))),
        // User-resolvable outcomes keep the {success, reason} shape.
        Err(
            e @ (crate::engine::EngineError::OrderNotFound(_)
            | crate::engine::EngineError::NotOrderOwner(_)
            | crate::engine::EngineError::NotCancellable(_)),
        ) => Ok(Json(ApiResponse::success(CancelOrderResponse {
            success: false,
            reason: Some(e.to_string()),
        }))),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct DepthQuery {
    pub symbol: String,
    pub depth: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DepthLevelDto {
    pub price: Decimal,
    pub qty: Decimal,
}

#[derive(Debug, Serialize)]
pub struct DepthResponse {
    pub symbol: String,
    pub bids: Vec<DepthLevelDto>,
    pub asks: Vec<DepthLevelDto>,
    pub ts: i64,
}

impl From<DepthSnapshot> for DepthResponse {
    fn from(snapshot: DepthSnapshot) -> Self {
        let convert = |levels: Vec<crate::engine::DepthLevel>| {
            levels
                .into_iter()
                .map(|level| DepthLevelDto {
                    price: from_quanta(level.price),
                    qty: from_quanta(level.quantity),
                })
                .collect()
        };
        Self {
            symbol: snapshot.symbol,
            bids: convert(snapshot.bids),
            asks: convert(snapshot.asks),
            ts: snapshot.ts,
        }
    }
}

/// Aggregated order-book depth, best levels first
/// GET /depth?symbol=BTCUSDT&depth=20
pub async fn get_depth(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DepthQuery>,
) -> Result<Json<ApiResponse<DepthResponse>>, AppError> {
    let levels = query.depth.unwrap_or(DEFAULT_DEPTH).min(MAX_DEPTH).max(1);
    let snapshot = state.engine.depth(&query.symbol, levels).await?;
    Ok(Json(ApiResponse::success(snapshot.into())))
}
