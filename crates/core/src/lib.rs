//! Domain types shared by every Jollyboard crate.
//!
//! Nothing here performs I/O: lock entries and the merged lock view, the
//! per-object lock state machine, the realtime protocol, and the store and
//! channel contracts implemented elsewhere.

pub mod collaboration;
pub mod error;
pub mod lock_state;
pub mod locks;
pub mod protocol;
pub mod store;
pub mod types;
