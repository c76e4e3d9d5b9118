//! Configuration Manager

use super::{Config, UnidentifiedSenderPolicy};
use crate::Result;
use anyhow::{Context, bail};
use axum::http::HeaderValue;
use std::path::Path;
use std::net::SocketAddr;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config.validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Override fields from environment-style key lookups.
    ///
    /// `PORT` only replaces the port of the bind address and is applied after
    /// `CHATRELAY_BIND_ADDR`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind_addr) = lookup("CHATRELAY_BIND_ADDR") {
            self.server.bind_addr = bind_addr.parse::<SocketAddr>()
                .with_context(|| format!("Invalid CHATRELAY_BIND_ADDR: {}", bind_addr))?;
        }

        if let Some(port) = lookup("PORT") {
            let port = port.parse::<u16>()
                .with_context(|| format!("Invalid PORT: {}", port))?;
            self.server.bind_addr.set_port(port);
        }

        if let Some(max_conn) = lookup("CHATRELAY_MAX_CONNECTIONS") {
            self.server.max_connections = max_conn.parse::<usize>()
                .with_context(|| format!("Invalid CHATRELAY_MAX_CONNECTIONS: {}", max_conn))?;
        }

        if let Some(queue) = lookup("CHATRELAY_SEND_QUEUE_SIZE") {
            self.server.send_queue_size = queue.parse::<usize>()
                .with_context(|| format!("Invalid CHATRELAY_SEND_QUEUE_SIZE: {}", queue))?;
        }

        if let Some(interval) = lookup("CHATRELAY_HEARTBEAT_INTERVAL") {
            self.server.heartbeat_interval = humantime::parse_duration(&interval)
                .with_context(|| format!("Invalid CHATRELAY_HEARTBEAT_INTERVAL: {}", interval))?;
        }

        if let Some(policy) = lookup("CHATRELAY_UNIDENTIFIED_SENDER") {
            self.relay.unidentified_sender = policy.parse::<UnidentifiedSenderPolicy>()
                .with_context(|| "Invalid CHATRELAY_UNIDENTIFIED_SENDER")?;
        }

        if let Some(log_level) = lookup("CHATRELAY_LOG_LEVEL") {
            self.monitoring.log_level = log_level;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_cors_config()
            .with_context(|| "CORS configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    fn validate_server_config(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            bail!("max_connections must be greater than 0");
        }

        if self.server.max_connections > 1_000_000 {
            bail!("max_connections cannot exceed 1,000,000");
        }

        if !self.server.ws_path.starts_with('/') {
            bail!("ws_path must start with '/'");
        }

        if self.server.send_queue_size == 0 {
            bail!("send_queue_size must be greater than 0");
        }

        if self.server.max_message_size < 1024 {
            bail!("max_message_size must be at least 1024 bytes");
        }

        if self.server.max_message_size > 16 * 1024 * 1024 {
            bail!("max_message_size cannot exceed 16MB");
        }

        if self.server.heartbeat_interval.is_zero() {
            bail!("heartbeat_interval must be greater than 0");
        }

        if self.server.client_timeout <= self.server.heartbeat_interval {
            bail!("client_timeout must be longer than heartbeat_interval");
        }

        Ok(())
    }

    fn validate_cors_config(&self) -> Result<()> {
        for origin in &self.cors.allowed_origins {
            if origin == "*" {
                if self.cors.allow_credentials {
                    bail!("wildcard origin '*' cannot be combined with allow_credentials");
                }
                continue;
            }

            HeaderValue::from_str(origin)
                .with_context(|| format!("Invalid allowed origin: {}", origin))?;
        }

        Ok(())
    }

    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!("monitoring.log_level must be one of: {}", valid_log_levels.join(", "));
        }

        let auth = &self.monitoring.management_api.auth;
        if self.monitoring.management_api.enabled && auth.enabled {
            let has_key = auth.api_key.as_deref().is_some_and(|key| !key.is_empty());
            let has_basic = auth.basic_auth.as_ref()
                .is_some_and(|basic| !basic.username.is_empty() && !basic.password.is_empty());

            if !has_key && !has_basic {
                bail!("management API auth is enabled but neither api_key nor basic_auth is set");
            }
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        port: Option<u16>,
        max_connections: Option<usize>,
        log_level: Option<&str>,
    ) -> Result<()> {
        if let Some(bind_str) = bind {
            self.server.bind_addr = bind_str.parse::<SocketAddr>()
                .with_context(|| format!("Invalid --bind address: {}", bind_str))?;
        }

        if let Some(port) = port {
            self.server.bind_addr.set_port(port);
        }

        if let Some(max_conn) = max_connections {
            self.server.max_connections = max_conn;
        }

        if let Some(level) = log_level {
            self.monitoring.log_level = level.to_string();
        }

        Ok(())
    }
}
