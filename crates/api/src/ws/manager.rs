use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use jollyboard_core::types::{BoardId, Timestamp, UserId};
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single realtime connection.
pub struct WsConnection {
    /// Board the connection is subscribed to.
    pub board_id: BoardId,
    /// Authenticated participant.
    pub user_id: UserId,
    /// Channel sender for outbound control frames to this connection.
    pub sender: WsSender,
    pub connected_at: Timestamp,
}

/// Tracks every open realtime connection.
///
/// Thread-safe via interior `RwLock`; wrapped in `Arc` and shared across the
/// application. Lock events do not flow through here; each connection
/// subscribes to its board channel directly. The manager only carries
/// heartbeat pings and shutdown close frames.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(
        &self,
        conn_id: String,
        board_id: BoardId,
        user_id: UserId,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            board_id,
            user_id,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID.
    pub async fn remove(&self, conn_id: &str) {
        let removed = self.connections.write().await.remove(conn_id);
        if let Some(conn) = removed {
            let connected_secs = (chrono::Utc::now() - conn.connected_at).num_seconds();
            tracing::debug!(
                conn_id,
                board_id = %conn.board_id,
                user_id = %conn.user_id,
                connected_secs,
                "Realtime connection removed"
            );
        }
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Number of connections open on `board_id`.
    pub async fn connections_on_board(&self, board_id: &str) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|conn| conn.board_id == board_id)
            .count()
    }

    /// Send a Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all realtime connections");
    }

    /// Send a Ping frame to every connected client.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
