//! Route definitions for board locks and the realtime relay.
//!
//! All endpoints require authentication via the `AuthUser` extractor.

use axum::routing::get;
use axum::Router;

use crate::handlers::locks;
use crate::state::AppState;
use crate::ws;

/// Board routes mounted at `/boards`.
///
/// ```text
/// GET    /{board_id}/locks       -> list_locks
/// POST   /{board_id}/locks       -> acquire_locks
/// PATCH  /{board_id}/locks       -> refresh_locks
/// DELETE /{board_id}/locks       -> release_locks
/// GET    /{board_id}/realtime    -> realtime_handler (WebSocket)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/{board_id}/locks",
            get(locks::list_locks)
                .post(locks::acquire_locks)
                .patch(locks::refresh_locks)
                .delete(locks::release_locks),
        )
        .route("/{board_id}/realtime", get(ws::realtime_handler))
}
