//! Presence Module
//!
//! Tracks which user identities currently hold a live connection.

pub mod handle;
pub mod registry;

pub use handle::{ConnectionHandle, ConnectionId, ConnectionLink, DeliveryError, Outbound};
pub use registry::PresenceRegistry;
