//! Connection Lifecycle
//!
//! Each transport connection is wrapped in a [`Session`] that walks
//! `Unidentified -> Identified -> Disconnected` and keeps the presence
//! registry in step with it.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{RelayConfig, UnidentifiedSenderPolicy};
use crate::dispatch::{DispatchEngine, DispatchOutcome, RejectReason};
use crate::metrics::Metrics;
use crate::presence::{ConnectionHandle, ConnectionId, ConnectionLink, Outbound, PresenceRegistry};
use crate::protocol::SendMessage;

/// Lifecycle state of one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Open, but no identity declared yet. Nothing can be routed to it.
    Unidentified,
    Identified(String),
    /// Terminal
    Disconnected,
}

/// Owns the presence registry and dispatch engine and hands out sessions
pub struct LifecycleManager {
    registry: Arc<PresenceRegistry>,
    dispatcher: DispatchEngine,
    metrics: Arc<Metrics>,
    unidentified_sender: UnidentifiedSenderPolicy,
    close_replaced_connections: bool,
}

impl LifecycleManager {
    pub fn new(config: &RelayConfig, registry: Arc<PresenceRegistry>, metrics: Arc<Metrics>) -> Self {
        let dispatcher = DispatchEngine::new(Arc::clone(&registry), Arc::clone(&metrics));

        Self {
            registry,
            dispatcher,
            metrics,
            unidentified_sender: config.unidentified_sender,
            close_replaced_connections: config.close_replaced_connections,
        }
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &DispatchEngine {
        &self.dispatcher
    }

    /// Accept a new connection in the `Unidentified` state
    pub fn open(self: &Arc<Self>, link: ConnectionLink) -> Session {
        self.metrics.connection_opened();
        debug!(connection_id = %link.id(), "Connection opened");

        Session {
            manager: Arc::clone(self),
            link,
            state: ConnectionState::Unidentified,
            opened_at: Instant::now(),
        }
    }
}

/// One connection's view of the relay.
///
/// Dropping a session disconnects it, so a connection task that ends for any
/// reason never leaves a registry entry behind.
pub struct Session {
    manager: Arc<LifecycleManager>,
    link: ConnectionLink,
    state: ConnectionState,
    opened_at: Instant,
}

impl Session {
    pub fn id(&self) -> ConnectionId {
        self.link.id()
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.link.handle()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn identity(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Identified(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.state == ConnectionState::Disconnected
    }

    /// Bind this connection to `identity`. Returns `false` once disconnected.
    pub fn identify(&mut self, identity: impl Into<String>) -> bool {
        let identity = identity.into();
        let handle = self.link.handle();

        match &self.state {
            ConnectionState::Disconnected => {
                debug!(connection_id = %self.id(), user_id = %identity, "Identify after disconnect ignored");
                return false;
            }
            ConnectionState::Identified(current) if *current != identity => {
                // One connection never holds two identities
                self.manager.registry.unregister(current, &handle);
                info!(connection_id = %self.id(), from = %current, to = %identity, "Connection changed identity");
            }
            _ => {}
        }

        let displaced = self.manager.registry.register(identity.clone(), handle);
        self.manager.metrics.identified(displaced.is_some());

        if let Some(previous) = displaced {
            debug!(
                user_id = %identity,
                previous = %previous.id(),
                connection_id = %self.id(),
                "Identity re-registered on a new connection"
            );

            if self.manager.close_replaced_connections {
                let reason = "identity connected elsewhere".to_string();
                if let Err(e) = previous.try_deliver(Outbound::Close { reason }) {
                    debug!(previous = %previous.id(), error = %e, "Could not signal replaced connection");
                }
            }
        }

        info!(connection_id = %self.id(), user_id = %identity, "User online");
        self.state = ConnectionState::Identified(identity);
        true
    }

    /// Route a message on behalf of this connection
    pub fn send_message(&self, message: SendMessage) -> DispatchOutcome {
        let SendMessage { sender_id, receiver_id, text, image } = message;

        let sender = match &self.state {
            ConnectionState::Disconnected => {
                let outcome = DispatchOutcome::Rejected { reason: RejectReason::Disconnected };
                self.manager.metrics.record_dispatch(outcome);
                return outcome;
            }
            ConnectionState::Identified(identity) => {
                if sender_id != *identity {
                    warn!(
                        connection_id = %self.id(),
                        user_id = %identity,
                        claimed = %sender_id,
                        "senderId does not match connection identity, using connection identity"
                    );
                }
                identity.clone()
            }
            ConnectionState::Unidentified => match self.manager.unidentified_sender {
                UnidentifiedSenderPolicy::Reject => {
                    warn!(connection_id = %self.id(), claimed = %sender_id, "Message from unidentified connection rejected");
                    let outcome = DispatchOutcome::Rejected { reason: RejectReason::Unidentified };
                    self.manager.metrics.record_dispatch(outcome);
                    return outcome;
                }
                UnidentifiedSenderPolicy::PassThrough => sender_id,
            },
        };

        self.manager.dispatcher.route(&sender, &receiver_id, text, image)
    }

    /// Evict this connection from the registry and enter `Disconnected`.
    /// Idempotent.
    pub fn disconnect(&mut self) -> Vec<String> {
        if self.is_disconnected() {
            return Vec::new();
        }

        let evicted = self.manager.registry.remove_by_handle(&self.link.handle());
        self.state = ConnectionState::Disconnected;

        self.manager.metrics.connection_closed(self.opened_at.elapsed());

        for identity in &evicted {
            info!(connection_id = %self.id(), user_id = %identity, "User offline");
        }
        debug!(connection_id = %self.id(), lifetime = ?self.opened_at.elapsed(), "Connection closed");

        evicted
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}
