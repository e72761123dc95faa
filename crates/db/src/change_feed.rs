//! Durable change notifications for `board_object_locks`.
//!
//! A trigger on the table publishes every insert, update and delete with
//! `pg_notify`. [`LockChangeFeed::listen`] holds one `PgListener` connection
//! and re-publishes each notification on a per-board broadcast channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jollyboard_core::protocol::LockChange;
use sqlx::postgres::PgListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::DbPool;

/// Postgres notification channel written by the table trigger.
pub const NOTIFY_CHANNEL: &str = "board_object_lock_changes";

/// Buffer capacity for each board's change channel.
const BOARD_CAPACITY: usize = 256;

/// Delay before re-connecting after the listener connection drops.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Per-board fan-out of lock row changes.
pub struct LockChangeFeed {
    boards: Mutex<HashMap<String, broadcast::Sender<LockChange>>>,
}

impl LockChangeFeed {
    pub fn new() -> Self {
        Self {
            boards: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to changes for one board.
    pub fn subscribe(&self, board_id: &str) -> broadcast::Receiver<LockChange> {
        let mut boards = self.boards.lock().unwrap_or_else(|e| e.into_inner());
        boards
            .entry(board_id.to_string())
            .or_insert_with(|| broadcast::channel(BOARD_CAPACITY).0)
            .subscribe()
    }

    /// Deliver a change to the board's subscribers.
    ///
    /// Returns the number of receivers handed the change. Senders whose
    /// receivers are all gone are dropped.
    pub fn dispatch(&self, change: LockChange) -> usize {
        let mut boards = self.boards.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = boards.get(&change.board_id) else {
            return 0;
        };
        let board_id = change.board_id.clone();
        match sender.send(change) {
            Ok(n) => n,
            Err(_) => {
                boards.remove(&board_id);
                0
            }
        }
    }

    /// Parse a notification payload produced by the table trigger.
    pub fn parse_payload(payload: &str) -> Option<LockChange> {
        match serde_json::from_str(payload) {
            Ok(change) => Some(change),
            Err(e) => {
                tracing::warn!(error = %e, payload, "Ignoring malformed lock change notification");
                None
            }
        }
    }

    /// Run the LISTEN loop until `cancel` fires.
    ///
    /// Connection failures are logged and retried after a short delay so a
    /// database restart does not permanently silence the feed.
    pub async fn listen(self: Arc<Self>, pool: DbPool, cancel: CancellationToken) {
        tracing::info!(channel = NOTIFY_CHANNEL, "Lock change feed started");

        loop {
            let mut listener = match Self::connect(&pool).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!(error = %e, "Lock change feed: connect failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                    continue;
                }
            };

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Lock change feed stopping");
                        return;
                    }
                    notification = listener.recv() => match notification {
                        Ok(notification) => {
                            if let Some(change) = Self::parse_payload(notification.payload()) {
                                let delivered = self.dispatch(change);
                                tracing::trace!(delivered, "Lock change dispatched");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Lock change feed: listener error, reconnecting");
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("Lock change feed stopping");
    }

    async fn connect(pool: &DbPool) -> Result<PgListener, sqlx::Error> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(NOTIFY_CHANNEL).await?;
        Ok(listener)
    }
}

impl Default for LockChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use jollyboard_core::protocol::ChangeKind;

    use super::*;

    fn change(board: &str, object: &str) -> LockChange {
        LockChange {
            kind: ChangeKind::Insert,
            board_id: board.to_string(),
            object_id: object.to_string(),
            user_id: "U1".to_string(),
        }
    }

    #[test]
    fn parse_trigger_payload() {
        let payload = r#"{"kind":"delete","boardId":"b1","objectId":"rect-1","userId":"U2"}"#;
        let change = LockChangeFeed::parse_payload(payload).unwrap();
        assert_eq!(change.kind, ChangeKind::Delete);
        assert_eq!(change.board_id, "b1");
        assert_eq!(change.object_id, "rect-1");
        assert_eq!(change.user_id, "U2");
    }

    #[test]
    fn parse_garbage_payload_returns_none() {
        assert!(LockChangeFeed::parse_payload("{}").is_none());
        assert!(LockChangeFeed::parse_payload("nope").is_none());
    }

    #[tokio::test]
    async fn dispatch_reaches_only_matching_board() {
        let feed = LockChangeFeed::new();
        let mut rx_one = feed.subscribe("b1");
        let mut rx_two = feed.subscribe("b2");

        assert_eq!(feed.dispatch(change("b1", "a")), 1);

        assert_eq!(rx_one.recv().await.unwrap().object_id, "a");
        assert!(rx_two.try_recv().is_err());
    }

    #[test]
    fn dispatch_without_subscribers_is_dropped() {
        let feed = LockChangeFeed::new();
        assert_eq!(feed.dispatch(change("b1", "a")), 0);

        let rx = feed.subscribe("b1");
        drop(rx);
        assert_eq!(feed.dispatch(change("b1", "a")), 0);
    }
}
