//! ChatRelay Library
//!
//! Real-time presence tracking and message routing relay.
//!
//! Clients open a WebSocket, identify themselves with a user id issued by an
//! external authentication service, and exchange short text/image messages
//! addressed by recipient id. Messages are delivered only to recipients that
//! currently hold a live connection; nothing is queued or persisted.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod management;
pub mod metrics;
pub mod presence;
pub mod protocol;
pub mod shutdown;

pub use config::Config;
pub use connection::{ConnectionManager, LifecycleManager, Session};
pub use dispatch::{DispatchEngine, DispatchOutcome};
pub use presence::{ConnectionHandle, ConnectionLink, PresenceRegistry};
pub use shutdown::ShutdownCoordinator;

/// Common error type for the relay server
pub type Result<T> = anyhow::Result<T>;
