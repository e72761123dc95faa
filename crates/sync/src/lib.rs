//! Client-side board synchronization.
//!
//! - [`LockClient`]: acquire and release object locks against a
//!   [`LockStore`](jollyboard_core::store::LockStore), announcing each change
//!   on the board's broadcast channel.
//! - [`SelectionBridge`]: turns canvas selection events into lock operations
//!   with optimistic local updates.
//! - [`BridgeDriver`]: async loop running the bridge's store I/O and feeding
//!   peer broadcasts and store changes back into it.
//! - [`sync_utils`]: object identity, interactivity and scene-coordinate
//!   helpers.
//! - [`MemoryLockStore`]: in-process store for headless clients and tests.

pub mod bridge;
pub mod canvas;
pub mod client;
pub mod driver;
pub mod memory;
pub mod sync_utils;

pub use bridge::{AcquireRequest, SelectionBridge, SelectionChange, SelectionOutcome};
pub use canvas::{Canvas, CanvasObject, Scene};
pub use client::{LockClient, LockClientConfig};
pub use driver::{BridgeDriver, CanvasEvent};
pub use memory::MemoryLockStore;
