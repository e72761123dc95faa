//! Reclamation of abandoned board locks.
//!
//! A client that crashes or loses its network never sends the release for
//! the objects it held. When a TTL is configured, this job deletes rows
//! whose `last_active` is older than the TTL and announces each release on
//! the owning board's channel so connected peers unlock the objects at once.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use jollyboard_core::protocol::BroadcastEvent;
use jollyboard_core::store::{LockStore, StoreError};
use jollyboard_core::types::{now_millis, BoardId, EpochMillis, ObjectId, UserId};
use jollyboard_events::BoardChannels;
use tokio_util::sync::CancellationToken;

/// Delete every lock idle since before `cutoff` and publish the releases.
///
/// Reclaimed rows are grouped per board and owner so each group produces a
/// single `lock_released` event. Returns the number of rows removed.
pub async fn sweep_once(
    store: &dyn LockStore,
    channels: &BoardChannels,
    cutoff: EpochMillis,
) -> Result<usize, StoreError> {
    let reclaimed = store.delete_stale(cutoff).await?;
    let count = reclaimed.len();

    let mut groups: BTreeMap<(BoardId, UserId), Vec<ObjectId>> = BTreeMap::new();
    for (board_id, entry) in reclaimed {
        groups
            .entry((board_id, entry.user_id))
            .or_default()
            .push(entry.object_id);
    }

    for ((board_id, user_id), object_ids) in groups {
        tracing::info!(
            board_id = %board_id,
            user_id = %user_id,
            count = object_ids.len(),
            "Reclaimed idle locks"
        );
        if let Some(event) = BroadcastEvent::released(&object_ids, &user_id) {
            channels.publish(&board_id, event);
        }
    }

    Ok(count)
}

/// Run the reclamation loop until `cancel` is triggered.
pub async fn run(
    store: Arc<dyn LockStore>,
    channels: Arc<BoardChannels>,
    ttl: Duration,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        ttl_secs = ttl.as_secs(),
        interval_secs = every.as_secs(),
        "Lock reclamation job started"
    );

    let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Lock reclamation job stopping");
                break;
            }
            _ = interval.tick() => {
                let cutoff = now_millis().saturating_sub(ttl_millis);
                match sweep_once(store.as_ref(), &channels, cutoff).await {
                    Ok(0) => tracing::debug!("Lock reclamation: nothing to reclaim"),
                    Ok(reclaimed) => tracing::info!(reclaimed, "Lock reclamation: released idle locks"),
                    Err(e) => tracing::error!(error = %e, "Lock reclamation: sweep failed"),
                }
            }
        }
    }
}
