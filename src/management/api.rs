//! Management API Routes

use super::{
    auth::{auth_middleware, ApiAuth},
    handlers::*,
    types::ApiAuthConfig,
};
use axum::{middleware, routing::get, Router};
use std::sync::Arc;

/// Management API router
pub struct ManagementApi;

impl ManagementApi {
    /// Create the management API router
    pub fn create_router(state: AppState, auth_config: ApiAuthConfig) -> Router {
        let auth = Arc::new(ApiAuth::new(auth_config));

        // Public routes (no authentication required)
        let public_routes = Router::new()
            .route("/health", get(health_check))
            .with_state(state.clone());

        let protected_routes = Router::new()
            .route("/status", get(get_server_status))
            .route("/config", get(get_config))
            .route("/presence", get(get_presence))
            .route("/presence/:user_id", get(get_user_presence))
            .route("/connections", get(get_connections))
            .route("/stats", get(get_stats))
            .route("/metrics", get(export_metrics))
            .layer(middleware::from_fn_with_state(auth, auth_middleware))
            .with_state(state);

        Router::new().nest("/api/v1", public_routes.merge(protected_routes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::connection::ConnectionManager;
    use crate::metrics::Metrics;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::time::SystemTime;
    use tower::ServiceExt;

    fn create_test_state() -> AppState {
        let config = Arc::new(Config::default());
        let metrics = Arc::new(Metrics::new());
        AppState {
            connections: Arc::new(ConnectionManager::new(Arc::clone(&config), Arc::clone(&metrics))),
            config,
            metrics,
            start_time: SystemTime::now(),
        }
    }

    fn key_auth() -> ApiAuthConfig {
        ApiAuthConfig {
            enabled: true,
            api_key: Some("test-key".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_public_health_endpoint() {
        let app = ManagementApi::create_router(create_test_state(), key_auth());

        let request = Request::builder()
            .uri("/api/v1/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_endpoint_without_auth() {
        let app = ManagementApi::create_router(create_test_state(), key_auth());

        let request = Request::builder()
            .uri("/api/v1/presence")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_protected_endpoint_with_auth() {
        let app = ManagementApi::create_router(create_test_state(), key_auth());

        let request = Request::builder()
            .uri("/api/v1/status")
            .header("x-api-key", "test-key")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
