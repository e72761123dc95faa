//! Board realtime relay over WebSocket.
//!
//! Provides connection management, heartbeat monitoring, and the HTTP
//! upgrade handler mounted at `/boards/{board_id}/realtime`.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::realtime_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
