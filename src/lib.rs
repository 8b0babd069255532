//! vigil - continuous HTTP security header scanner with live updates
//!
//! A scan loop probes a fixed list of endpoints for common header
//! misconfigurations and atomically publishes a JSON report. A separate
//! distribution pipeline notices each new report and pushes a `reload`
//! token to every connected WebSocket subscriber.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod http;
pub mod models;
pub mod registry;
pub mod scanner;
pub mod store;
pub mod watcher;
