use std::sync::Arc;

use jollyboard_db::PgLockStore;
use jollyboard_events::BoardChannels;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: everything is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: jollyboard_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Durable lock rows plus their change feed.
    pub store: Arc<PgLockStore>,
    /// Per-board broadcast channels relayed over WebSocket.
    pub channels: Arc<BoardChannels>,
    /// Open realtime connections.
    pub ws_manager: Arc<WsManager>,
}
