use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use jollyboard_core::collaboration::validate_id;
use jollyboard_core::protocol::{BroadcastEvent, LockChange, RealtimeFrame};
use jollyboard_core::store::{BroadcastChannel, LockStore};
use jollyboard_core::types::BoardId;
use jollyboard_events::decode_event;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Upgrade to the board's realtime relay.
///
/// Inbound text frames are lock broadcasts published to the board channel.
/// Outbound frames are peers' broadcasts plus durable store changes, each
/// wrapped in a [`RealtimeFrame`].
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    auth: AuthUser,
    State(state): State<AppState>,
    Path(board_id): Path<BoardId>,
) -> AppResult<Response> {
    validate_id("boardId", &board_id)?;
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, board_id, auth))
        .into_response())
}

/// Manage one realtime connection after upgrade.
///
///   1. Registers the connection with `WsManager` and subscribes to the board
///      channel and the store change feed.
///   2. Spawns a sender task forwarding control frames, peer broadcasts and
///      row changes to the sink.
///   3. Publishes inbound broadcasts on the current task.
///   4. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, state: AppState, board_id: BoardId, auth: AuthUser) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, board_id = %board_id, user_id = %auth.user_id, "Realtime connected");

    let mut control = state
        .ws_manager
        .add(conn_id.clone(), board_id.clone(), auth.user_id.clone())
        .await;
    let channel = state.channels.channel(&board_id);
    let mut broadcasts = channel.subscribe();
    let mut changes = match state.store.subscribe(&board_id).await {
        Ok(rx) => Some(rx),
        Err(e) => {
            tracing::warn!(conn_id = %conn_id, error = %e, "Lock change feed unavailable");
            None
        }
    };

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let self_id = auth.user_id.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                msg = control.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
                event = broadcasts.recv() => match event {
                    // The sender already applied its own event optimistically.
                    Ok(event) if event.user_id() == self_id => continue,
                    Ok(event) => match encode(&RealtimeFrame::Broadcast { event }) {
                        Some(msg) => msg,
                        None => continue,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(conn_id = %sender_conn_id, skipped, "Realtime relay lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                change = recv_change(&mut changes) => match change {
                    Ok(change) => match encode(&RealtimeFrame::LockChange { change }) {
                        Some(msg) => msg,
                        None => continue,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(conn_id = %sender_conn_id, skipped, "Change relay lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        changes = None;
                        continue;
                    }
                },
            };
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || closing {
                tracing::debug!(conn_id = %sender_conn_id, "Realtime sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                relay_inbound(&channel, text.as_str(), &auth, &conn_id).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    state.ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, board_id = %board_id, "Realtime disconnected");
}

/// Validate an inbound frame and publish it on the board channel.
///
/// Frames that fail to parse, or that claim another user's identity, are
/// dropped.
async fn relay_inbound(
    channel: &jollyboard_events::BoardChannel,
    raw: &str,
    auth: &AuthUser,
    conn_id: &str,
) {
    let event: BroadcastEvent = match decode_event(raw) {
        Ok(event) => event,
        Err(reason) => {
            tracing::debug!(conn_id = %conn_id, %reason, "Dropping malformed realtime frame");
            return;
        }
    };
    if event.user_id() != auth.user_id {
        tracing::warn!(
            conn_id = %conn_id,
            claimed = %event.user_id(),
            user_id = %auth.user_id,
            "Dropping broadcast with foreign userId"
        );
        return;
    }
    if let Err(e) = channel.send(event).await {
        tracing::warn!(conn_id = %conn_id, error = %e, "Broadcast publish failed");
    }
}

fn encode(frame: &RealtimeFrame) -> Option<Message> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode realtime frame");
            None
        }
    }
}

async fn recv_change(
    rx: &mut Option<broadcast::Receiver<LockChange>>,
) -> Result<LockChange, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
