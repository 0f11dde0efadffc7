//! Health & readiness.
//!
//! Liveness: operational-store ping, relational-store ping, matching-lane
//! heartbeats. Readiness additionally requires the seed markers, every
//! lane running, and change-queue depths below the critical threshold.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, Json};
use parking_lot::RwLock;
use serde::Serialize;

use crate::db::Database;
use crate::engine::MatchingEngine;
use crate::store::{EntityKind, OperationalStore, SyncQueue};

/// A lane is considered dead after missing three 5s heartbeats.
const LANE_STALE_AFTER: Duration = Duration::from_secs(15);

const PROBE_INTERVAL: Duration = Duration::from_secs(5);

const STORE_LATENCY_BUDGET: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ProbeStatus {
    fn worst(self, other: ProbeStatus) -> ProbeStatus {
        use ProbeStatus::*;
        match (self, other) {
            (Unhealthy, _) | (_, Unhealthy) => Unhealthy,
            (Degraded, _) | (_, Degraded) => Degraded,
            _ => Healthy,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaneReport {
    pub symbol: String,
    pub running: bool,
    pub halted: bool,
    pub last_heartbeat_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueReport {
    pub kind: String,
    pub depth: i64,
    pub status: ProbeStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub store: ComponentHealth,
    pub database: ComponentHealth,
    pub lanes: Vec<LaneReport>,
    pub queues: Vec<QueueReport>,
    pub seeded: bool,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        let pending = ComponentHealth {
            status: ProbeStatus::Unhealthy,
            latency_ms: None,
            detail: Some("not probed yet".to_string()),
        };
        Self {
            store: pending.clone(),
            database: pending,
            lanes: Vec::new(),
            queues: Vec::new(),
            seeded: false,
        }
    }
}

/// Shared snapshot the HTTP handlers read; refreshed by [`HealthMonitor`].
pub struct HealthState {
    snapshot: RwLock<HealthSnapshot>,
    seeded: AtomicBool,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(HealthSnapshot::default()),
            seeded: AtomicBool::new(false),
        }
    }

    pub fn mark_seeded(&self) {
        self.seeded.store(true, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.snapshot.read().clone()
    }

    /// Liveness: the three probes, worst-of.
    pub fn live_status(&self) -> ProbeStatus {
        let snapshot = self.snapshot.read();
        let lanes_ok = snapshot.lanes.iter().all(|l| l.running && !l.halted);
        let lanes = if lanes_ok {
            ProbeStatus::Healthy
        } else {
            ProbeStatus::Unhealthy
        };
        snapshot.store.status.worst(snapshot.database.status).worst(lanes)
    }

    /// Readiness: liveness plus seed, lanes and queue-depth gates.
    pub fn ready(&self) -> bool {
        if !self.seeded.load(Ordering::Relaxed) {
            return false;
        }
        let snapshot = self.snapshot.read();
        let lanes_ok =
            !snapshot.lanes.is_empty() && snapshot.lanes.iter().all(|l| l.running && !l.halted);
        let queues_ok = snapshot
            .queues
            .iter()
            .all(|q| q.status != ProbeStatus::Unhealthy);
        lanes_ok
            && queues_ok
            && snapshot.store.status != ProbeStatus::Unhealthy
            && snapshot.database.status != ProbeStatus::Unhealthy
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Background prober feeding [`HealthState`].
pub struct HealthMonitor<S> {
    store: Arc<S>,
    db: Database,
    engine: Arc<MatchingEngine<S>>,
    queue: SyncQueue<S>,
    state: Arc<HealthState>,
    degraded_depth: i64,
    critical_depth: i64,
}

impl<S: OperationalStore> HealthMonitor<S> {
    pub fn new(
        store: Arc<S>,
        db: Database,
        engine: Arc<MatchingEngine<S>>,
        state: Arc<HealthState>,
        degraded_depth: i64,
        critical_depth: i64,
    ) -> Self {
        Self {
            queue: SyncQueue::new(Arc::clone(&store)),
            store,
            db,
            engine,
            state,
            degraded_depth,
            critical_depth,
        }
    }

    pub async fn run(self) {
        let mut tick = tokio::time::interval(PROBE_INTERVAL);
        loop {
            tick.tick().await;
            let snapshot = self.probe().await;
            *self.state.snapshot.write() = snapshot;
        }
    }

    async fn probe(&self) -> HealthSnapshot {
        let store = match self.store.ping().await {
            Ok(latency) => {
                crate::metrics::record_store_ping(latency.as_secs_f64());
                ComponentHealth {
                    status: if latency <= STORE_LATENCY_BUDGET {
                        ProbeStatus::Healthy
                    } else {
                        ProbeStatus::Degraded
                    },
                    latency_ms: Some(latency.as_millis() as u64),
                    detail: None,
                }
            }
            Err(e) => ComponentHealth {
                status: ProbeStatus::Unhealthy,
                latency_ms: None,
                detail: Some(e.to_string()),
            },
        };

        let database = match self.db.ping().await {
            Ok(latency) => ComponentHealth {
                status: if latency <= STORE_LATENCY_BUDGET {
                    ProbeStatus::Healthy
                } else {
                    ProbeStatus::Degraded
                },
                latency_ms: Some(latency.as_millis() as u64),
                detail: None,
            },
            Err(e) => ComponentHealth {
                status: ProbeStatus::Unhealthy,
                latency_ms: None,
                detail: Some(e.to_string()),
            },
        };

        let stale_cutoff =
            chrono::Utc::now().timestamp_millis() - LANE_STALE_AFTER.as_millis() as i64;
        let lanes = self
            .engine
            .lane_statuses()
            .into_iter()
            .map(|lane| LaneReport {
                running: lane.last_heartbeat_ms >= stale_cutoff && !lane.halted,
                symbol: lane.symbol,
                halted: lane.halted,
                last_heartbeat_ms: lane.last_heartbeat_ms,
            })
            .collect();

        let mut queues = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            let depth = self.queue.depth(kind).await.unwrap_or(i64::MAX);
            crate::metrics::set_sync_queue_depth(&kind.to_string(), depth);
            let status = if depth >= self.critical_depth {
                ProbeStatus::Unhealthy
            } else if depth >= self.degraded_depth {
                ProbeStatus::Degraded
            } else {
                ProbeStatus::Healthy
            };
            queues.push(QueueReport {
                kind: kind.to_string(),
                depth,
                status,
            });
        }

        HealthSnapshot {
            store,
            database,
            lanes,
            queues,
            seeded: self.state.seeded.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// HTTP handlers
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: ProbeStatus,
    #[serde(flatten)]
    pub snapshot: HealthSnapshot,
}

pub async fn live(
    State(state): State<Arc<crate::AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let health = &state.health;
    let status = health.live_status();
    let code = if status == ProbeStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (
        code,
        Json(HealthResponse {
            status,
            snapshot: health.snapshot(),
        }),
    )
}

pub async fn ready(
    State(state): State<Arc<crate::AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let health = &state.health;
    let ready = health.ready();
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let status = if ready {
        health.live_status()
    } else {
        ProbeStatus::Unhealthy
    };
    (
        code,
        Json(HealthResponse {
            status,
            snapshot: health.snapshot(),
        }),
    )
}
