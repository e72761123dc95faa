//! Handlers for the board lock rows API.
//!
//! These endpoints write the durable rows only. Peers learn about the
//! changes through the store change feed relayed on the realtime socket.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use jollyboard_core::collaboration::{validate_id, validate_object_ids};
use jollyboard_core::locks::LockEntry;
use jollyboard_core::store::LockStore;
use jollyboard_core::types::{now_millis, BoardId};
use jollyboard_db::models::board_lock::{ListLocksQuery, LockIdsRequest};
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Count of rows affected by a refresh or release.
#[derive(Debug, Serialize)]
pub struct AffectedRows {
    pub affected: u64,
}

/// GET /api/v1/boards/{board_id}/locks[?ids=a,b]
///
/// Current lock rows for the board, optionally restricted to some objects.
pub async fn list_locks(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(board_id): Path<BoardId>,
    Query(query): Query<ListLocksQuery>,
) -> AppResult<impl IntoResponse> {
    validate_id("boardId", &board_id)?;

    let locks = match query.object_ids() {
        Some(ids) => {
            validate_object_ids(&ids)?;
            state.store.select_by_board_and_ids(&board_id, &ids).await?
        }
        None => state.store.select_by_board(&board_id).await?,
    };

    Ok(Json(DataResponse { data: locks }))
}

/// POST /api/v1/boards/{board_id}/locks
///
/// Insert rows owned by the caller, all or nothing. Returns 409 if any of
/// the objects is already locked.
pub async fn acquire_locks(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(board_id): Path<BoardId>,
    Json(input): Json<LockIdsRequest>,
) -> AppResult<impl IntoResponse> {
    validate_id("boardId", &board_id)?;
    validate_object_ids(&input.object_ids)?;

    let now = now_millis();
    let entries: Vec<LockEntry> = input
        .object_ids
        .iter()
        .map(|id| {
            LockEntry::new(
                id.as_str(),
                auth.user_id.as_str(),
                auth.user_name.as_str(),
                now,
            )
        })
        .collect();

    state.store.insert_many(&board_id, &entries).await?;

    tracing::info!(
        board_id = %board_id,
        user_id = %auth.user_id,
        count = entries.len(),
        "Locks acquired"
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: entries })))
}

/// PATCH /api/v1/boards/{board_id}/locks
///
/// Refresh `lastActive` on the caller's own rows. Rows held by others are
/// left untouched and not counted.
pub async fn refresh_locks(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(board_id): Path<BoardId>,
    Json(input): Json<LockIdsRequest>,
) -> AppResult<impl IntoResponse> {
    validate_id("boardId", &board_id)?;
    validate_object_ids(&input.object_ids)?;

    let affected = state
        .store
        .update_many(&board_id, &input.object_ids, &auth.user_id, now_millis())
        .await?;

    Ok(Json(DataResponse {
        data: AffectedRows { affected },
    }))
}

/// DELETE /api/v1/boards/{board_id}/locks
///
/// Delete the caller's own rows. Idempotent.
pub async fn release_locks(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(board_id): Path<BoardId>,
    Json(input): Json<LockIdsRequest>,
) -> AppResult<impl IntoResponse> {
    validate_id("boardId", &board_id)?;
    validate_object_ids(&input.object_ids)?;

    let affected = state
        .store
        .delete_many(&board_id, &input.object_ids, &auth.user_id)
        .await?;

    tracing::info!(
        board_id = %board_id,
        user_id = %auth.user_id,
        affected,
        "Locks released"
    );

    Ok(Json(DataResponse {
        data: AffectedRows { affected },
    }))
}
