//! Configuration file loading tests

use chatrelay::config::{ConfigManager, UnidentifiedSenderPolicy};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_full_config_file() {
    let file = write_config(r#"
[server]
bind_addr = "127.0.0.1:5050"
ws_path = "/socket"
max_connections = 250
send_queue_size = 16
heartbeat_interval = "10s"
client_timeout = "45s"
shutdown_timeout = "3s"

[relay]
unidentified_sender = "pass_through"
close_replaced_connections = true

[cors]
allowed_origins = ["https://chat.example.com", "http://localhost:5173"]
allow_credentials = true

[monitoring]
log_level = "debug"
prometheus_enabled = false

[monitoring.management_api]
enabled = true
bind_addr = "127.0.0.1:9090"

[monitoring.management_api.auth]
enabled = true
api_key = "ops-key"
"#);

    let config = ConfigManager::load_from_file(file.path()).unwrap();

    assert_eq!(config.server.bind_addr, "127.0.0.1:5050".parse().unwrap());
    assert_eq!(config.server.ws_path, "/socket");
    assert_eq!(config.server.max_connections, 250);
    assert_eq!(config.server.send_queue_size, 16);
    assert_eq!(config.server.heartbeat_interval, Duration::from_secs(10));
    assert_eq!(config.server.client_timeout, Duration::from_secs(45));
    assert_eq!(config.relay.unidentified_sender, UnidentifiedSenderPolicy::PassThrough);
    assert!(config.relay.close_replaced_connections);
    assert_eq!(config.cors.allowed_origins.len(), 2);
    assert!(!config.monitoring.prometheus_enabled);
    assert_eq!(config.monitoring.management_api.auth.api_key.as_deref(), Some("ops-key"));
}

#[test]
fn test_partial_file_uses_defaults() {
    let file = write_config(r#"
[server]
bind_addr = "0.0.0.0:6000"
"#);

    let config = ConfigManager::load_from_file(file.path()).unwrap();

    assert_eq!(config.server.bind_addr.port(), 6000);
    assert_eq!(config.server.ws_path, "/ws");
    assert_eq!(config.relay.unidentified_sender, UnidentifiedSenderPolicy::Reject);
    assert!(!config.relay.close_replaced_connections);
    assert_eq!(config.cors.allowed_origins, vec!["http://localhost:5173".to_string()]);
}

#[test]
fn test_invalid_file_is_rejected() {
    let file = write_config(r#"
[server]
heartbeat_interval = "30s"
client_timeout = "10s"
"#);
    assert!(ConfigManager::load_from_file(file.path()).is_err());

    let file = write_config("[relay]\nunidentified_sender = \"maybe\"\n");
    assert!(ConfigManager::load_from_file(file.path()).is_err());

    let file = write_config("this is not toml");
    assert!(ConfigManager::load_from_file(file.path()).is_err());
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigManager::load_from_file(&dir.path().join("absent.toml")).unwrap();

    assert_eq!(config.server.bind_addr.port(), 5000);
}
