use std::sync::Arc;
use std::time::Duration;

use jollyboard_events::BoardChannels;

use crate::ws::manager::WsManager;

/// Interval between heartbeat pings (in seconds).
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Spawn a background task that pings every realtime connection and drops
/// board channels nobody is subscribed to anymore.
///
/// The task runs until aborted during shutdown.
pub fn start_heartbeat(
    ws_manager: Arc<WsManager>,
    channels: Arc<BoardChannels>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));

        loop {
            interval.tick().await;
            let count = ws_manager.connection_count().await;
            tracing::debug!(count, "Realtime heartbeat ping");
            ws_manager.ping_all().await;

            let pruned = channels.prune_idle();
            if pruned > 0 {
                tracing::debug!(pruned, boards = channels.board_count(), "Pruned idle board channels");
            }
        }
    })
}
