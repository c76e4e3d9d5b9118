//! Dispatch Types

use chrono::{DateTime, Utc};
use std::fmt;

use crate::presence::ConnectionId;

/// A routed message, stamped by the relay at dispatch time
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Why a message was refused before routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The sending connection has not identified yet
    Unidentified,
    /// The sending connection is already disconnected
    Disconnected,
}

/// Result of routing one message. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Queued on the recipient's connection
    Delivered { connection_id: ConnectionId },
    /// No live connection for the recipient
    RecipientOffline,
    /// The recipient's outbound queue was full; the message was dropped
    QueueFull,
    /// Refused by the sender's connection state
    Rejected { reason: RejectReason },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Delivered { .. } => "delivered",
            DispatchOutcome::RecipientOffline => "recipient_offline",
            DispatchOutcome::QueueFull => "queue_full",
            DispatchOutcome::Rejected { reason: RejectReason::Unidentified } => "rejected_unidentified",
            DispatchOutcome::Rejected { reason: RejectReason::Disconnected } => "rejected_disconnected",
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
