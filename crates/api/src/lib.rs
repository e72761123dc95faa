//! Jollyboard API server library.
//!
//! Hosts the lock rows API and the per-board realtime channel for browser
//! clients. Exposed as a library so integration tests and the binary
//! entrypoint share the same router and state.

pub mod auth;
pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
