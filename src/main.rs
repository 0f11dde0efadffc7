use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spot_core::api;
use spot_core::config::AppConfig;
use spot_core::db::{Database, PgDurable};
use spot_core::engine::MatchingEngine;
use spot_core::health::{HealthMonitor, HealthState};
use spot_core::metrics;
use spot_core::publisher::PublisherHub;
use spot_core::store::{keys, EntityKind, OperationalStore, RedisStore};
use spot_core::sync::{SeedLoader, SyncWorker};
use spot_core::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spot_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("Starting Spot Core v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.environment);

    // Initialize metrics exporter
    let metrics_handle = metrics::init_metrics();

    // Relational store, honouring the configured fail-fast/retry policy.
    // A startup without it is fatal either way: the seed cannot run.
    let db = connect_relational(&config).await?;
    tracing::info!("Relational store connected");

    // Operational store owns the hot path; it is required at boot
    let store = Arc::new(
        RedisStore::from_url(&config.redis_url)
            .await
            .map_err(|e| anyhow::anyhow!("operational store unreachable: {}", e))?,
    );
    tracing::info!("Operational store connected at {}", config.redis_url);

    // Seed cold state into the operational store
    let durable = Arc::new(PgDurable::new(db.pool.clone()));
    let seeder = SeedLoader::new(Arc::clone(&store), Arc::clone(&durable));
    let pairs = seeder
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("seed failed: {}", e))?;
    tracing::info!("Seed completed, {} active trading pairs", pairs.len());

    // Publisher hub and matching engine (one lane per pair)
    let hub = Arc::new(PublisherHub::new(
        config.publisher.delta_buffer,
        config.publisher.tape_buffer,
    ));
    let engine = MatchingEngine::start(
        Arc::clone(&store),
        Arc::clone(&hub),
        pairs,
        config.intake_deadline(),
    )
    .await
    .map_err(|e| anyhow::anyhow!("matching engine failed to start: {}", e))?;
    tracing::info!("Matching engine initialized for {:?}", engine.symbols());

    // Durable synchroniser: one drain worker per entity kind
    for kind in EntityKind::ALL {
        let worker = SyncWorker::new(
            kind,
            Arc::clone(&store),
            Arc::clone(&durable),
            config.sync_config(),
        );
        tokio::spawn(worker.run());
    }
    tracing::info!("Durable synchroniser workers started");

    // Health monitoring
    let health = Arc::new(HealthState::new());
    health.mark_seeded();
    let monitor = HealthMonitor::new(
        Arc::clone(&store),
        db.clone(),
        Arc::clone(&engine),
        Arc::clone(&health),
        config.sync.degraded_depth,
        config.sync.critical_depth,
    );
    tokio::spawn(monitor.run());
    tracing::info!("Health monitor started");

    // Mirror market-data groups onto Redis pub/sub for external consumers
    for symbol in engine.symbols() {
        for group in [
            keys::group_orderbook(&symbol),
            keys::group_trades(&symbol),
            keys::group_ticker(&symbol),
        ] {
            let subscription = hub.subscribe(&group);
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                loop {
                    let message = subscription.recv().await;
                    match serde_json::to_string(&message) {
                        Ok(json) => {
                            if let Err(e) = store.publish(subscription.group(), &json).await {
                                tracing::warn!(
                                    group = subscription.group(),
                                    error = %e,
                                    "failed to mirror push message"
                                );
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to serialise push message");
                        }
                    }
                }
            });
        }
    }
    tracing::info!("Redis pub/sub mirror workers spawned");

    // Build application state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        store,
        engine,
        hub,
        health,
        metrics: metrics_handle,
    });

    // Build router
    let app = Router::new()
        .route("/health/live", get(spot_core::health::live))
        .route("/health/ready", get(spot_core::health::ready))
        .route("/metrics", get(render_metrics))
        .nest("/api/v1", api::routes::create_router())
        .layer(axum::middleware::from_fn(api::middleware::track_metrics))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn render_metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics.render()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install shutdown handler: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

/// Connect to the relational store under the HealthChecks policy:
/// fail-fast probes once and bails, otherwise retry `max_retries` times
/// with `retry_delay_seconds` between attempts.
async fn connect_relational(config: &AppConfig) -> anyhow::Result<Database> {
    let policy = &config.health_checks;
    let attempts = if policy.fail_fast {
        1
    } else {
        policy.max_retries.max(1)
    };

    let mut last_error: Option<anyhow::Error> = None;
    for attempt in 1..=attempts {
        match Database::connect(&config.database_url).await {
            Ok(db) => match db.ping().await {
                Ok(_) => return Ok(db),
                Err(e) => last_error = Some(e.into()),
            },
            Err(e) => last_error = Some(e.into()),
        }
        if attempt < attempts {
            tracing::warn!(
                attempt,
                max_retries = attempts,
                retry_delay_seconds = policy.retry_delay_seconds,
                "relational store unreachable, retrying"
            );
            tokio::time::sleep(Duration::from_secs(policy.retry_delay_seconds)).await;
        }
    }
    Err(anyhow::anyhow!(
        "relational store unreachable after {} attempt(s): {}",
        attempts,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}
