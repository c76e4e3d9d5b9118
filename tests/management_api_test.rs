//! Management API Integration Tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chatrelay::{
    config::Config,
    management::{types::BasicAuthConfig, ManagementServer},
    metrics::Metrics,
    ConnectionLink, ConnectionManager,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

struct Harness {
    connections: Arc<ConnectionManager>,
    server: ManagementServer,
}

fn harness(config: Config) -> Harness {
    let config = Arc::new(config);
    let metrics = Arc::new(Metrics::new());
    let connections = Arc::new(ConnectionManager::new(Arc::clone(&config), Arc::clone(&metrics)));
    let server = ManagementServer::new(config, metrics, Arc::clone(&connections));

    Harness { connections, server }
}

async fn get_json(harness: &Harness, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = harness.server.create_test_router().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_management_api_health_endpoint() {
    let harness = harness(Config::default());

    let (status, body) = get_json(&harness, "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
}

#[tokio::test]
async fn test_presence_endpoints_track_sessions() {
    let harness = harness(Config::default());
    let lifecycle = harness.connections.lifecycle();

    let (alice_link, _alice_rx) = ConnectionLink::new(4);
    let (bob_link, _bob_rx) = ConnectionLink::new(4);
    let mut alice = lifecycle.open(alice_link);
    let mut bob = lifecycle.open(bob_link);
    bob.identify("bob");
    alice.identify("alice");

    let (status, body) = get_json(&harness, "/api/v1/presence").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 2);
    assert_eq!(body["data"]["users"], serde_json::json!(["alice", "bob"]));

    let (_, body) = get_json(&harness, "/api/v1/presence/alice").await;
    assert_eq!(body["data"]["online"], true);
    assert_eq!(body["data"]["connection_id"], alice.id().to_string());

    alice.disconnect();
    let (_, body) = get_json(&harness, "/api/v1/presence/alice").await;
    assert_eq!(body["data"]["online"], false);
}

#[tokio::test]
async fn test_stats_endpoint_reports_counters() {
    let harness = harness(Config::default());
    let lifecycle = harness.connections.lifecycle();

    let (link, _rx) = ConnectionLink::new(4);
    let mut session = lifecycle.open(link);
    session.identify("alice");
    lifecycle.dispatcher().route("alice", "nobody", "hello?", None);

    let (status, body) = get_json(&harness, "/api/v1/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["identify_events"], 1);
    assert_eq!(body["data"]["messages_offline"], 1);
    assert_eq!(body["data"]["online_users"], 1);
}

#[tokio::test]
async fn test_prometheus_endpoint() {
    let harness = harness(Config::default());

    let request = Request::builder().uri("/api/v1/metrics").body(Body::empty()).unwrap();
    let response = harness.server.create_test_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("chatrelay_active_connections"));
}

#[tokio::test]
async fn test_basic_auth_protects_endpoints() {
    let mut config = Config::default();
    config.monitoring.management_api.auth.enabled = true;
    config.monitoring.management_api.auth.basic_auth = Some(BasicAuthConfig {
        username: "ops".to_string(),
        password: "pager".to_string(),
    });
    let harness = harness(config);

    let (status, _) = get_json(&harness, "/api/v1/connections").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get_json(&harness, "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .uri("/api/v1/connections?page=1&limit=10")
        .header("authorization", format!("Basic {}", general_purpose::STANDARD.encode("ops:pager")))
        .body(Body::empty())
        .unwrap();
    let response = harness.server.create_test_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_config_endpoint_hides_credentials() {
    let mut config = Config::default();
    config.monitoring.management_api.auth.api_key = Some("not-for-your-eyes".to_string());
    let harness = harness(config);

    let (status, body) = get_json(&harness, "/api/v1/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["data"]["monitoring"]["management_api"]["auth"]["api_key"], "not-for-your-eyes");
    assert_eq!(body["data"]["server"]["ws_path"], "/ws");
}
