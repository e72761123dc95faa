//! Per-board broadcast channels backed by `tokio::sync::broadcast`.
//!
//! Delivery is best-effort and at-most-once: publishing with no subscribers
//! drops the event, and a receiver that falls behind observes
//! `RecvError::Lagged`. The durable store change feed is the correctness
//! backstop, so nothing here retries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jollyboard_core::protocol::BroadcastEvent;
use jollyboard_core::store::{BroadcastChannel, ChannelError};
use tokio::sync::broadcast;

/// Default buffer capacity for each board's channel.
const DEFAULT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// BoardChannel
// ---------------------------------------------------------------------------

/// Fan-out channel for a single board's lock events.
pub struct BoardChannel {
    board_id: String,
    sender: broadcast::Sender<BroadcastEvent>,
}

impl BoardChannel {
    /// Create a channel with a specific buffer capacity.
    pub fn new(board_id: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            board_id: board_id.into(),
            sender,
        }
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers that were handed the event.
    pub fn publish(&self, event: BroadcastEvent) -> usize {
        // A SendError only means there are zero receivers.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl BroadcastChannel for BoardChannel {
    async fn send(&self, event: BroadcastEvent) -> Result<(), ChannelError> {
        let delivered = self.publish(event);
        tracing::trace!(board_id = %self.board_id, delivered, "Broadcast published");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.sender.subscribe()
    }
}

/// Decode and validate a broadcast payload received from the wire.
pub fn decode_event(raw: &str) -> Result<BroadcastEvent, String> {
    let event: BroadcastEvent = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    event.validate()?;
    Ok(event)
}

// ---------------------------------------------------------------------------
// BoardChannels
// ---------------------------------------------------------------------------

/// Hub handing out one [`BoardChannel`] per board.
///
/// Channels are created on first use and pruned by [`prune_idle`] once no
/// subscriber is left.
///
/// [`prune_idle`]: BoardChannels::prune_idle
pub struct BoardChannels {
    capacity: usize,
    channels: Mutex<HashMap<String, Arc<BoardChannel>>>,
}

impl BoardChannels {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the channel for `board_id`.
    pub fn channel(&self, board_id: &str) -> Arc<BoardChannel> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            channels
                .entry(board_id.to_string())
                .or_insert_with(|| Arc::new(BoardChannel::new(board_id, self.capacity))),
        )
    }

    /// Publish on a board's channel if it exists.
    ///
    /// Boards nobody listens to have no channel, so the event is dropped.
    pub fn publish(&self, board_id: &str, event: BroadcastEvent) -> usize {
        let channel = {
            let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
            channels.get(board_id).cloned()
        };
        channel.map_or(0, |c| c.publish(event))
    }

    /// Drop channels that have no subscribers. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let before = channels.len();
        channels.retain(|_, c| c.subscriber_count() > 0);
        before - channels.len()
    }

    pub fn board_count(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Default for BoardChannels {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
