//! # courier-server
//!
//! WebSocket/HTTP server for the Courier message-delivery engine.
//!
//! Exposed as a library so integration tests can bind an ephemeral port and
//! drive a real server; the `courier` binary is a thin wrapper.

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{app, run_server, serve, AppState};
