use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::AppState;

pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(handlers::submit_order))
        .route("/orders/:order_id", delete(handlers::cancel_order))
        .route("/depth", get(handlers::get_depth))
}
