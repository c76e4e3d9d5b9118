//! Wire Protocol Types
//!
//! Every text frame carries one event of the form
//! `{"event": "<name>", "data": <payload>}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::MessageEvent;

/// Events sent by clients
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Declare the user id this connection speaks for
    #[serde(rename = "identify", alias = "addUser")]
    Identify(String),
    #[serde(rename = "sendMessage")]
    SendMessage(SendMessage),
}

/// Payload of a `sendMessage` event
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// Events pushed to clients
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "receiveMessage")]
    ReceiveMessage(ReceiveMessage),
}

/// Payload of a `receiveMessage` event
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveMessage {
    pub sender_id: String,
    pub text: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<MessageEvent> for ReceiveMessage {
    fn from(event: MessageEvent) -> Self {
        Self {
            sender_id: event.sender_id,
            text: event.text,
            image: event.image,
            created_at: event.created_at,
        }
    }
}

impl From<MessageEvent> for ServerEvent {
    fn from(event: MessageEvent) -> Self {
        ServerEvent::ReceiveMessage(event.into())
    }
}
