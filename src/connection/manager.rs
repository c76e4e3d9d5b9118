//! Connection Manager Implementation
//!
//! Serves the relay's WebSocket endpoint, tracks open connections, and drives
//! each connection's [`Session`] from transport events.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::Context;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{Duration, MissedTickBehavior};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, instrument, warn};

use super::{LifecycleManager, Session};
use crate::config::{Config, CorsConfig};
use crate::metrics::Metrics;
use crate::presence::{ConnectionId, ConnectionLink, Outbound, PresenceRegistry};
use crate::protocol::{decode_client_event, encode_server_event, ClientEvent, ServerEvent};
use crate::Result;

/// Connection information for tracking
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub user_id: Option<String>,
    pub start_time: Instant,
}

/// Connection statistics
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub active_connections: usize,
    pub total_connections_served: usize,
    pub max_connections_allowed: usize,
}

/// Holds one of the `max_connections` slots until dropped
struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Manages WebSocket connections and their lifecycle
pub struct ConnectionManager {
    config: Arc<Config>,
    lifecycle: Arc<LifecycleManager>,
    metrics: Arc<Metrics>,
    active_connections: Arc<AtomicUsize>,
    total_connections: AtomicUsize,
    connection_tracker: RwLock<HashMap<ConnectionId, ConnectionInfo>>,
    shutdown_flag: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl ConnectionManager {
    /// Create a new ConnectionManager with a fresh presence registry
    pub fn new(config: Arc<Config>, metrics: Arc<Metrics>) -> Self {
        let registry = Arc::new(PresenceRegistry::new());
        let lifecycle = Arc::new(LifecycleManager::new(&config.relay, registry, Arc::clone(&metrics)));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            lifecycle,
            metrics,
            active_connections: Arc::new(AtomicUsize::new(0)),
            total_connections: AtomicUsize::new(0),
            connection_tracker: RwLock::new(HashMap::new()),
            shutdown_flag: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        self.lifecycle.registry()
    }

    /// Build the relay's HTTP router: the WebSocket endpoint plus a JSON 404
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(&self.config.server.ws_path, get(ws_upgrade))
            .fallback(route_not_found)
            .layer(cors_layer(&self.config.cors))
            .with_state(Arc::clone(self))
    }

    /// Bind the configured address and serve until shutdown
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let bind_addr = self.config.server.bind_addr;

        info!("Binding relay listener to {}", bind_addr);
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind relay listener to {}", bind_addr))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!("Relay listening on ws://{}{}", local_addr, self.config.server.ws_path);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let app = self.router();

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .context("Relay server error")?;

        info!("Relay listener stopped");
        Ok(())
    }

    fn try_acquire_slot(&self) -> Option<ConnectionSlot> {
        let max = self.config.server.max_connections;
        self.active_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| ConnectionSlot {
                active: Arc::clone(&self.active_connections),
            })
    }

    /// Drive one upgraded connection until it closes
    #[instrument(skip(self, socket, _slot), fields(peer = %addr))]
    async fn handle_socket(self: Arc<Self>, socket: WebSocket, addr: SocketAddr, _slot: ConnectionSlot) {
        let (link, mut outbound_rx) = ConnectionLink::new(self.config.server.send_queue_size);
        let mut session = self.lifecycle.open(link);
        let connection_id = session.id();

        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.connection_tracker.write().await.insert(
            connection_id,
            ConnectionInfo {
                id: connection_id,
                addr,
                user_id: None,
                start_time: Instant::now(),
            },
        );
        info!(connection_id = %connection_id, "Client connected");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let (mut sink, mut stream) = socket.split();

        let client_timeout = self.config.server.client_timeout;
        let mut heartbeat = tokio::time::interval(self.config.server.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;
        let mut last_seen = Instant::now();

        let reason = if self.is_shutting_down() {
            let _ = sink.send(close_message(close_code::AWAY, "server shutting down")).await;
            "server shutdown"
        } else {
            loop {
                tokio::select! {
                    frame = stream.next() => match frame {
                        Some(Ok(message)) => {
                            last_seen = Instant::now();
                            match message {
                                Message::Text(text) => self.handle_text(&mut session, &text).await,
                                Message::Binary(_) => {
                                    debug!(connection_id = %connection_id, "Ignoring binary frame");
                                }
                                Message::Close(_) => break "client closed",
                                Message::Ping(_) | Message::Pong(_) => {}
                            }
                        }
                        Some(Err(e)) => {
                            debug!(connection_id = %connection_id, error = %e, "WebSocket transport error");
                            break "transport error";
                        }
                        None => break "stream ended",
                    },
                    outbound = outbound_rx.recv() => match outbound {
                        Some(Outbound::Message(event)) => {
                            let frame = match encode_server_event(&ServerEvent::from(event)) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    warn!(connection_id = %connection_id, error = %e, "Dropping unencodable event");
                                    continue;
                                }
                            };
                            if sink.send(Message::Text(frame)).await.is_err() {
                                break "send failed";
                            }
                        }
                        Some(Outbound::Close { reason }) => {
                            let _ = sink.send(close_message(close_code::POLICY, &reason)).await;
                            break "replaced";
                        }
                        None => break "outbound closed",
                    },
                    _ = heartbeat.tick() => {
                        if last_seen.elapsed() > client_timeout {
                            let _ = sink.send(close_message(close_code::AWAY, "heartbeat timeout")).await;
                            break "heartbeat timeout";
                        }
                        if sink.send(Message::Ping(Vec::new())).await.is_err() {
                            break "send failed";
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = sink.send(close_message(close_code::AWAY, "server shutting down")).await;
                        break "server shutdown";
                    }
                }
            }
        };

        session.disconnect();

        let mut tracker = self.connection_tracker.write().await;
        if let Some(removed) = tracker.remove(&connection_id) {
            info!(
                connection_id = %connection_id,
                user_id = removed.user_id.as_deref().unwrap_or("-"),
                reason,
                "Client disconnected after {:?}",
                removed.start_time.elapsed()
            );
        }
    }

    async fn handle_text(&self, session: &mut Session, frame: &str) {
        match decode_client_event(frame) {
            Ok(ClientEvent::Identify(user_id)) => {
                if session.identify(user_id.clone()) {
                    if let Some(info) = self.connection_tracker.write().await.get_mut(&session.id()) {
                        info.user_id = Some(user_id);
                    }
                }
            }
            Ok(ClientEvent::SendMessage(message)) => {
                let outcome = session.send_message(message);
                debug!(connection_id = %session.id(), outcome = %outcome, "Message routed");
            }
            Err(e) => {
                self.metrics.malformed_frame();
                warn!(connection_id = %session.id(), error = %e, "Ignoring malformed frame");
            }
        }
    }

    /// Get the current number of open connections
    pub fn get_active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    /// Get information about all open connections
    pub async fn get_active_connection_info(&self) -> Vec<ConnectionInfo> {
        let tracker = self.connection_tracker.read().await;
        tracker.values().cloned().collect()
    }

    /// Get connection statistics
    pub fn get_connection_stats(&self) -> ConnectionStats {
        ConnectionStats {
            active_connections: self.get_active_connections(),
            total_connections_served: self.total_connections.load(Ordering::Relaxed),
            max_connections_allowed: self.config.server.max_connections,
        }
    }

    /// Initiate graceful shutdown
    pub fn initiate_shutdown(&self) {
        if self.shutdown_flag.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Initiating graceful shutdown of connection manager");
        if let Err(e) = self.shutdown_tx.send(()) {
            debug!("No listeners for shutdown signal: {}", e);
        }
    }

    /// Get a shutdown receiver for external components
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Check if shutdown has been initiated
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    /// Wait for all connections to close, up to `server.shutdown_timeout`
    pub async fn wait_for_connections_to_close(&self) -> Result<()> {
        let shutdown_timeout = self.config.server.shutdown_timeout;
        let start_time = Instant::now();

        info!("Waiting for {} active connections to close (timeout: {:?})",
              self.get_active_connections(), shutdown_timeout);

        while self.get_active_connections() > 0 && start_time.elapsed() < shutdown_timeout {
            debug!("Waiting for {} active connections to close", self.get_active_connections());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let remaining = self.get_active_connections();
        let elapsed = start_time.elapsed();

        if remaining == 0 {
            info!("All connections closed gracefully in {:?}", elapsed);
        } else {
            warn!("Shutdown timeout reached after {:?} with {} connections still active",
                  elapsed, remaining);
        }

        Ok(())
    }

    /// Gracefully shutdown the connection manager
    pub async fn shutdown(&self) -> Result<()> {
        self.initiate_shutdown();
        self.wait_for_connections_to_close().await
    }
}

async fn ws_upgrade(
    State(manager): State<Arc<ConnectionManager>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    if manager.is_shutting_down() {
        debug!("Rejecting connection from {} due to shutdown", addr);
        return (StatusCode::SERVICE_UNAVAILABLE, "Relay is shutting down").into_response();
    }

    let Some(slot) = manager.try_acquire_slot() else {
        warn!("Connection limit reached, rejecting connection from {}", addr);
        return (StatusCode::SERVICE_UNAVAILABLE, "Connection limit reached").into_response();
    };

    ws.max_message_size(manager.config.server.max_message_size)
        .on_upgrade(move |socket| manager.handle_socket(socket, addr, slot))
}

async fn route_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "API route not found" })))
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];

    if config.allowed_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config.allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(config.allow_credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn manager(max_connections: usize) -> Arc<ConnectionManager> {
        let mut config = Config::default();
        config.server.max_connections = max_connections;
        Arc::new(ConnectionManager::new(Arc::new(config), Arc::new(Metrics::new())))
    }

    #[test]
    fn test_slots_respect_limit() {
        let manager = manager(2);

        let first = manager.try_acquire_slot();
        let second = manager.try_acquire_slot();
        assert!(first.is_some() && second.is_some());
        assert!(manager.try_acquire_slot().is_none());
        assert_eq!(manager.get_active_connections(), 2);

        drop(first);
        assert_eq!(manager.get_active_connections(), 1);
        assert!(manager.try_acquire_slot().is_some());
    }

    #[tokio::test]
    async fn test_unknown_route_returns_json_404() {
        let app = manager(10).router();

        let request = Request::builder()
            .uri("/api/nothing-here")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], "API route not found");
    }

    #[tokio::test]
    async fn test_initiate_shutdown_notifies_subscribers() {
        let manager = manager(10);
        let mut rx = manager.subscribe_shutdown();

        manager.initiate_shutdown();
        manager.initiate_shutdown();

        assert!(manager.is_shutting_down());
        assert!(rx.recv().await.is_ok());
    }
}
