//! Connection Management Module
//!
//! Serves the WebSocket endpoint and moves each connection through its
//! lifecycle.

pub mod lifecycle;
pub mod manager;

pub use lifecycle::{ConnectionState, LifecycleManager, Session};
pub use manager::{ConnectionInfo, ConnectionManager, ConnectionStats};
