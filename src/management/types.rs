//! Management API Types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::SystemTime;

use crate::metrics::MetricsSnapshot;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: SystemTime,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: SystemTime::now(),
        }
    }
}

/// Server status information
#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub uptime_seconds: u64,
    pub active_connections: usize,
    pub max_connections: usize,
    pub total_connections: u64,
    pub online_users: usize,
    pub shutting_down: bool,
    pub version: String,
}

/// Identities with a live connection
#[derive(Debug, Serialize)]
pub struct PresenceList {
    pub count: usize,
    pub users: Vec<String>,
}

/// Presence of a single identity
#[derive(Debug, Serialize)]
pub struct UserPresence {
    pub user_id: String,
    pub online: bool,
    pub connection_id: Option<String>,
}

/// Connection information
#[derive(Debug, Serialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub client_addr: SocketAddr,
    pub user_id: Option<String>,
    pub connected_seconds: u64,
    pub status: String,
}

/// Statistics summary
#[derive(Debug, Serialize)]
pub struct StatsSummary {
    pub uptime_seconds: u64,
    pub total_connections_served: usize,
    #[serde(flatten)]
    pub counters: MetricsSnapshot,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub checks: HashMap<String, CheckResult>,
    pub timestamp: SystemTime,
}

/// Individual health check result
#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: Option<String>,
    pub duration_ms: u64,
}

/// API authentication configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiAuthConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub basic_auth: Option<BasicAuthConfig>,
}

/// Basic authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: String,
}
