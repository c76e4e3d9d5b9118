//! Management API Server

use super::{
    api::ManagementApi,
    handlers::AppState,
    types::ApiAuthConfig,
};
use crate::{config::Config, connection::ConnectionManager, metrics::Metrics, Result};
use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Management API server
pub struct ManagementServer {
    bind_addr: SocketAddr,
    app_state: AppState,
    auth_config: ApiAuthConfig,
}

impl ManagementServer {
    /// Create a new management server
    pub fn new(
        config: Arc<Config>,
        metrics: Arc<Metrics>,
        connections: Arc<ConnectionManager>,
    ) -> Self {
        let bind_addr = config.monitoring.management_api.bind_addr;
        let auth_config = config.monitoring.management_api.auth.clone();
        let app_state = AppState {
            config,
            metrics,
            connections,
            start_time: SystemTime::now(),
        };

        Self {
            bind_addr,
            app_state,
            auth_config,
        }
    }

    /// Start the management API server; it stops with the relay
    pub async fn start(self) -> Result<()> {
        info!("Starting management API server on {}", self.bind_addr);

        let mut shutdown_rx = self.app_state.connections.subscribe_shutdown();
        let app = ManagementApi::create_router(self.app_state, self.auth_config);

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind management API server to {}", self.bind_addr))?;

        info!("Management API server listening on {}", self.bind_addr);

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
        {
            error!("Management API server error: {}", e);
            return Err(e.into());
        }

        Ok(())
    }

    /// Create a router for testing
    pub fn create_test_router(&self) -> Router {
        ManagementApi::create_router(self.app_state.clone(), self.auth_config.clone())
    }
}
