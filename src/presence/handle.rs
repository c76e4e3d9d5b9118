//! Connection Handles
//!
//! The transport owns one [`ConnectionLink`] per live connection. Everything
//! else, the presence registry in particular, holds [`ConnectionHandle`]s that
//! point at the link's outbound queue without keeping it alive.

use std::fmt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::dispatch::MessageEvent;

/// Stable identifier of one transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0.simple())
    }
}

/// Frames queued for a connection's writer
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(MessageEvent),
    Close { reason: String },
}

/// Why a frame could not be queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    QueueFull,
    Closed,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::QueueFull => write!(f, "outbound queue full"),
            DeliveryError::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Owning side of a connection's outbound queue
#[derive(Debug)]
pub struct ConnectionLink {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionLink {
    /// Create a link with a bounded outbound queue, returning the receiver
    /// the connection writer drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let link = Self {
            id: ConnectionId::new(),
            tx,
        };
        (link, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Non-owning handle for this connection
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            id: self.id,
            tx: self.tx.downgrade(),
        }
    }
}

/// Non-owning reference to a live connection.
///
/// Two handles are equal when they refer to the same connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::WeakSender<Outbound>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the owning link still exists and its receiver is open
    pub fn is_alive(&self) -> bool {
        self.tx.upgrade().is_some_and(|tx| !tx.is_closed())
    }

    /// Queue a frame without waiting for capacity
    pub fn try_deliver(&self, frame: Outbound) -> Result<(), DeliveryError> {
        let tx = self.tx.upgrade().ok_or(DeliveryError::Closed)?;
        tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_compare_by_connection() {
        let (link_a, _rx_a) = ConnectionLink::new(4);
        let (link_b, _rx_b) = ConnectionLink::new(4);

        assert_eq!(link_a.handle(), link_a.handle());
        assert_ne!(link_a.handle(), link_b.handle());
    }

    #[test]
    fn test_handle_does_not_keep_link_alive() {
        let (link, _rx) = ConnectionLink::new(4);
        let handle = link.handle();
        assert!(handle.is_alive());

        drop(link);
        assert!(!handle.is_alive());
        assert_eq!(
            handle.try_deliver(Outbound::Close { reason: "bye".into() }),
            Err(DeliveryError::Closed)
        );
    }

    #[test]
    fn test_full_queue_is_reported() {
        let (link, mut rx) = ConnectionLink::new(1);
        let handle = link.handle();

        assert!(handle.try_deliver(Outbound::Close { reason: "one".into() }).is_ok());
        assert_eq!(
            handle.try_deliver(Outbound::Close { reason: "two".into() }),
            Err(DeliveryError::QueueFull)
        );

        assert_eq!(rx.try_recv().unwrap(), Outbound::Close { reason: "one".into() });
    }

    #[test]
    fn test_closed_receiver_is_reported() {
        let (link, rx) = ConnectionLink::new(4);
        let handle = link.handle();
        drop(rx);

        assert!(!handle.is_alive());
        assert_eq!(
            handle.try_deliver(Outbound::Close { reason: "bye".into() }),
            Err(DeliveryError::Closed)
        );
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new();
        assert!(id.to_string().starts_with("conn_"));
    }
}
