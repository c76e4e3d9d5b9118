//! Dispatch Module
//!
//! Resolves message recipients against the presence registry and forwards
//! messages to their live connection.

pub mod engine;
pub mod types;

pub use engine::DispatchEngine;
pub use types::{DispatchOutcome, MessageEvent, RejectReason};
