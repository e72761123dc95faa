pub mod health;
pub mod locks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /boards/{board_id}/locks                         list, acquire, refresh, release
/// /boards/{board_id}/realtime                      WebSocket relay (?token=...)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/boards", locks::router())
}
