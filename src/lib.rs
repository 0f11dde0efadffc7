//! Spot Exchange Core
//!
//! Order lifecycle and matching pipeline with a Redis-first state store
//! and deferred relational persistence.
//!
//! # Architecture
//!
//! ```text
//! API Handler
//!   ↓
//! MatchingEngine (one single-writer lane per symbol)
//!   ├→ OrderBook (owned by the lane)
//!   ├→ Settlement scripts (atomic, on the operational store)
//!   ├→ Change queues (per entity kind)
//!   └→ PublisherHub (book deltas, tape, tickers, user events)
//!
//! SyncWorker (per entity kind) → relational store
//! SeedLoader (startup)         ← relational store
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod health;
pub mod metrics;
pub mod models;
pub mod publisher;
pub mod store;
pub mod sync;
pub mod utils;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::AppConfig;
use crate::db::Database;
use crate::engine::MatchingEngine;
use crate::health::HealthState;
use crate::publisher::PublisherHub;
use crate::store::RedisStore;

pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub store: Arc<RedisStore>,
    pub engine: Arc<MatchingEngine<RedisStore>>,
    pub hub: Arc<PublisherHub>,
    pub health: Arc<HealthState>,
    pub metrics: PrometheusHandle,
}
