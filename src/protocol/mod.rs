//! Wire Protocol Module
//!
//! JSON events exchanged over the relay's WebSocket connections.

pub mod codec;
pub mod types;

pub use codec::{decode_client_event, encode_server_event};
pub use types::{ClientEvent, ReceiveMessage, SendMessage, ServerEvent};
