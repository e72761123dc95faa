//! Jollyboard realtime broadcast channels.
//!
//! - [`BoardChannel`]: best-effort publish/subscribe for one board, backed by
//!   `tokio::sync::broadcast`.
//! - [`BoardChannels`]: hub that lazily creates and hands out one channel per
//!   board, shared via `Arc` across WebSocket handlers and background tasks.

pub mod channel;

pub use channel::{decode_event, BoardChannel, BoardChannels};
