//! Dispatch Engine

use std::sync::Arc;
use chrono::Utc;
use tracing::{debug, warn};

use super::{DispatchOutcome, MessageEvent};
use crate::metrics::Metrics;
use crate::presence::{DeliveryError, Outbound, PresenceRegistry};

/// Routes messages to the recipient's live connection.
///
/// Delivery is best-effort and at-most-once: offline recipients and full
/// outbound queues drop the message, and routing never waits.
pub struct DispatchEngine {
    registry: Arc<PresenceRegistry>,
    metrics: Arc<Metrics>,
}

impl DispatchEngine {
    /// Create a new dispatch engine
    pub fn new(registry: Arc<PresenceRegistry>, metrics: Arc<Metrics>) -> Self {
        Self { registry, metrics }
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    /// Route one message from `sender` to `recipient`
    pub fn route(
        &self,
        sender: &str,
        recipient: &str,
        text: impl Into<String>,
        image: Option<String>,
    ) -> DispatchOutcome {
        let outcome = match self.registry.lookup(recipient) {
            None => {
                debug!(sender_id = %sender, recipient_id = %recipient, "Recipient offline, message dropped");
                DispatchOutcome::RecipientOffline
            }
            Some(handle) => {
                let event = MessageEvent {
                    sender_id: sender.to_string(),
                    recipient_id: recipient.to_string(),
                    text: text.into(),
                    image,
                    created_at: Utc::now(),
                };

                match handle.try_deliver(Outbound::Message(event)) {
                    Ok(()) => {
                        debug!(
                            sender_id = %sender,
                            recipient_id = %recipient,
                            connection_id = %handle.id(),
                            "Message delivered"
                        );
                        DispatchOutcome::Delivered { connection_id: handle.id() }
                    }
                    Err(DeliveryError::QueueFull) => {
                        warn!(
                            sender_id = %sender,
                            recipient_id = %recipient,
                            connection_id = %handle.id(),
                            "Outbound queue full, message dropped"
                        );
                        DispatchOutcome::QueueFull
                    }
                    // Connection is gone but its disconnect has not been processed yet
                    Err(DeliveryError::Closed) => {
                        debug!(
                            sender_id = %sender,
                            recipient_id = %recipient,
                            connection_id = %handle.id(),
                            "Recipient connection closing, message dropped"
                        );
                        DispatchOutcome::RecipientOffline
                    }
                }
            }
        };

        self.metrics.record_dispatch(outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::ConnectionLink;

    fn engine() -> DispatchEngine {
        DispatchEngine::new(Arc::new(PresenceRegistry::new()), Arc::new(Metrics::new()))
    }

    #[test]
    fn test_route_to_online_recipient() {
        let engine = engine();
        let (bob, mut bob_rx) = ConnectionLink::new(4);
        engine.registry().register("bob", bob.handle());

        let before = Utc::now();
        let outcome = engine.route("alice", "bob", "hi", Some("img.png".to_string()));
        let after = Utc::now();

        assert_eq!(outcome, DispatchOutcome::Delivered { connection_id: bob.id() });
        match bob_rx.try_recv().unwrap() {
            Outbound::Message(event) => {
                assert_eq!(event.sender_id, "alice");
                assert_eq!(event.recipient_id, "bob");
                assert_eq!(event.text, "hi");
                assert_eq!(event.image.as_deref(), Some("img.png"));
                assert!(event.created_at >= before && event.created_at <= after);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
        assert!(bob_rx.try_recv().is_err());
    }

    #[test]
    fn test_route_to_offline_recipient() {
        let engine = engine();
        assert_eq!(engine.route("alice", "carol", "hi", None), DispatchOutcome::RecipientOffline);
    }

    #[test]
    fn test_route_to_dropped_link_counts_as_offline() {
        let engine = engine();
        let (bob, bob_rx) = ConnectionLink::new(4);
        engine.registry().register("bob", bob.handle());
        drop(bob_rx);

        assert_eq!(engine.route("alice", "bob", "hi", None), DispatchOutcome::RecipientOffline);
    }

    #[test]
    fn test_full_queue_drops_message() {
        let engine = engine();
        let (bob, _bob_rx) = ConnectionLink::new(1);
        engine.registry().register("bob", bob.handle());

        assert!(engine.route("alice", "bob", "one", None).is_delivered());
        assert_eq!(engine.route("alice", "bob", "two", None), DispatchOutcome::QueueFull);
    }
}
