//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use crate::management::types::ApiAuthConfig;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub cors: CorsConfig,
    pub monitoring: MonitoringConfig,
}

/// Relay listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub ws_path: String,
    pub max_connections: usize,
    /// Outbound frames buffered per connection before messages are dropped
    pub send_queue_size: usize,
    pub max_message_size: usize,
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub client_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// How to treat `sendMessage` events from connections that never identified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnidentifiedSenderPolicy {
    /// Drop the message without routing it
    Reject,
    /// Route it using the unverified `senderId` from the payload
    PassThrough,
}

impl std::str::FromStr for UnidentifiedSenderPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(Self::Reject),
            "pass_through" => Ok(Self::PassThrough),
            other => Err(anyhow::anyhow!(
                "unidentified_sender must be 'reject' or 'pass_through', got '{}'",
                other
            )),
        }
    }
}

/// Presence and routing behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    pub unidentified_sender: UnidentifiedSenderPolicy,
    /// Close the previous connection when an identity re-identifies elsewhere
    pub close_replaced_connections: bool,
}

/// Cross-origin settings for the relay listener
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub prometheus_enabled: bool,
    pub management_api: ManagementApiConfig,
}

/// Management API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagementApiConfig {
    pub enabled: bool,
    pub bind_addr: SocketAddr,
    pub auth: ApiAuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            relay: RelayConfig::default(),
            cors: CorsConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            ws_path: "/ws".to_string(),
            max_connections: 10_000,
            send_queue_size: 64,
            max_message_size: 1024 * 1024,
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(90),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            unidentified_sender: UnidentifiedSenderPolicy::Reject,
            close_replaced_connections: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:5173".to_string()],
            allow_credentials: true,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            prometheus_enabled: true,
            management_api: ManagementApiConfig::default(),
        }
    }
}

impl Default for ManagementApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            auth: ApiAuthConfig::default(),
        }
    }
}
