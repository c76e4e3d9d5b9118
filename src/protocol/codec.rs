//! Event encoding and decoding

use anyhow::Context;

use super::{ClientEvent, ServerEvent};
use crate::Result;

/// Parse one inbound text frame
pub fn decode_client_event(frame: &str) -> Result<ClientEvent> {
    serde_json::from_str(frame).context("Malformed client event")
}

/// Render one outbound event as a text frame
pub fn encode_server_event(event: &ServerEvent) -> Result<String> {
    serde_json::to_string(event).context("Failed to encode server event")
}
