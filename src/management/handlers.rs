//! Management API Handlers

use super::types::*;
use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::metrics::Metrics;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

const REDACTED: &str = "********";

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub metrics: Arc<Metrics>,
    pub connections: Arc<ConnectionManager>,
    pub start_time: SystemTime,
}

impl AppState {
    fn uptime_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or_default()
            .as_secs()
    }

    /// Metrics with the online-users gauge taken from the registry as it is now
    fn current_metrics(&self) -> &Metrics {
        self.metrics.set_online_users(self.connections.registry().len());
        &self.metrics
    }
}

/// Query parameters for pagination
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let mut checks = HashMap::new();

    let started = Instant::now();
    let relay_status = if state.connections.is_shutting_down() {
        ("unhealthy", "Relay is shutting down")
    } else {
        ("healthy", "Relay is accepting connections")
    };
    checks.insert(
        "relay".to_string(),
        CheckResult {
            status: relay_status.0.to_string(),
            message: Some(relay_status.1.to_string()),
            duration_ms: started.elapsed().as_millis() as u64,
        },
    );

    let started = Instant::now();
    let stats = state.connections.get_connection_stats();
    let usage = stats.active_connections as f64 / stats.max_connections_allowed.max(1) as f64;
    checks.insert(
        "capacity".to_string(),
        CheckResult {
            status: if usage < 0.9 { "healthy" } else { "warning" }.to_string(),
            message: Some(format!(
                "{} of {} connection slots in use",
                stats.active_connections, stats.max_connections_allowed
            )),
            duration_ms: started.elapsed().as_millis() as u64,
        },
    );

    let overall_status = if checks.values().all(|c| c.status == "healthy") {
        "healthy"
    } else if checks.values().any(|c| c.status == "unhealthy") {
        "unhealthy"
    } else {
        "degraded"
    };

    let health = HealthStatus {
        status: overall_status.to_string(),
        checks,
        timestamp: SystemTime::now(),
    };

    Json(ApiResponse::success(health))
}

/// Get server status
pub async fn get_server_status(State(state): State<AppState>) -> Json<ApiResponse<ServerStatus>> {
    let stats = state.connections.get_connection_stats();

    let status = ServerStatus {
        uptime_seconds: state.uptime_seconds(),
        active_connections: stats.active_connections,
        max_connections: stats.max_connections_allowed,
        total_connections: state.metrics.get_total_connections(),
        online_users: state.connections.registry().len(),
        shutting_down: state.connections.is_shutting_down(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    Json(ApiResponse::success(status))
}

/// List identities that are currently online
pub async fn get_presence(State(state): State<AppState>) -> Json<ApiResponse<PresenceList>> {
    let users = state.connections.registry().online_users();

    Json(ApiResponse::success(PresenceList {
        count: users.len(),
        users,
    }))
}

/// Presence of one identity
pub async fn get_user_presence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<ApiResponse<UserPresence>> {
    let handle = state.connections.registry().lookup(&user_id);

    Json(ApiResponse::success(UserPresence {
        online: handle.is_some(),
        connection_id: handle.map(|h| h.id().to_string()),
        user_id,
    }))
}

/// Get active connections
pub async fn get_connections(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationQuery>,
) -> Json<ApiResponse<Vec<ConnectionInfo>>> {
    let mut connections = state.connections.get_active_connection_info().await;
    connections.sort_by_key(|c| c.start_time);

    let page = pagination.page.unwrap_or(1).max(1);
    let limit = pagination.limit.unwrap_or(50).min(1000); // Cap at 1000
    let start = (page - 1).saturating_mul(limit);

    let paginated: Vec<ConnectionInfo> = connections
        .into_iter()
        .skip(start)
        .take(limit)
        .map(|c| ConnectionInfo {
            id: c.id.to_string(),
            client_addr: c.addr,
            status: if c.user_id.is_some() { "identified" } else { "unidentified" }.to_string(),
            user_id: c.user_id,
            connected_seconds: c.start_time.elapsed().as_secs(),
        })
        .collect();

    Json(ApiResponse::success(paginated))
}

/// Get statistics summary
pub async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<StatsSummary>> {
    let stats = StatsSummary {
        uptime_seconds: state.uptime_seconds(),
        total_connections_served: state.connections.get_connection_stats().total_connections_served,
        counters: state.current_metrics().snapshot(),
    };

    Json(ApiResponse::success(stats))
}

/// Export metrics in Prometheus text format
pub async fn export_metrics(State(state): State<AppState>) -> Result<String, StatusCode> {
    if !state.config.monitoring.prometheus_enabled {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(state.current_metrics().export_prometheus())
}

/// Get current configuration with credentials masked
pub async fn get_config(State(state): State<AppState>) -> Json<ApiResponse<Config>> {
    let mut config = (*state.config).clone();

    let auth = &mut config.monitoring.management_api.auth;
    if let Some(key) = auth.api_key.as_mut() {
        *key = REDACTED.to_string();
    }
    if let Some(basic) = auth.basic_auth.as_mut() {
        basic.password = REDACTED.to_string();
    }

    Json(ApiResponse::success(config))
}
