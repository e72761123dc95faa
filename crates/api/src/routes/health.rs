//! Liveness and readiness for the lock server.

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the lock store is unreachable.
    pub status: &'static str,
    pub version: &'static str,
    pub db_healthy: bool,
    /// Open realtime sockets.
    pub connections: usize,
    /// Boards with a live broadcast channel.
    pub active_boards: usize,
    /// Idle lock TTL, absent when reclamation is off.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_ttl_secs: Option<u64>,
}

/// GET /health
///
/// Degraded rather than failing when Postgres is down: connected clients keep
/// their broadcasts flowing even though new acquisitions are denied.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = jollyboard_db::health_check(&state.pool).await.is_ok();

    Json(HealthResponse {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        connections: state.ws_manager.connection_count().await,
        active_boards: state.channels.board_count(),
        lock_ttl_secs: state.config.lock_ttl_secs,
    })
}

/// Mounted at the root, outside `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
