use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use xpost_scheduler::StatusCell;

/// Shared state for the HTTP handlers.
pub struct AppState {
    pub status: StatusCell,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(status: StatusCell) -> Self {
        Self {
            status,
            started_at: Utc::now(),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// GET /health: scheduler snapshot. 503 when the loop is not running or the
/// last probe found a problem.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let snapshot = state.status.snapshot();
    let healthy = snapshot.running
        && snapshot
            .last_health
            .as_ref()
            .map_or(true, |report| report.healthy());

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if healthy { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
        "scheduler": snapshot,
    });
    (code, Json(body))
}
