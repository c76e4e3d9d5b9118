//! Management API Module
//!
//! Read-only REST API for inspecting presence, connections and counters.

pub mod api;
pub mod auth;
pub mod handlers;
pub mod server;
pub mod types;

pub use api::ManagementApi;
pub use auth::ApiAuth;
pub use handlers::AppState;
pub use server::ManagementServer;
pub use types::*;
