// Dispatcher HTTP API
// REST surface consumed by the assistant frontend and the admin dashboard.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::router::QueryDispatcher;
use handlers::{
    cleanup_cache, dispatch_query, health_check, list_templates, not_found, route_test, stats,
    suggestions, DispatcherState,
};

/// Dispatcher API server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
            cors_enabled: true,
        }
    }
}

/// Dispatcher API server
pub struct DispatcherServer {
    config: ServerConfig,
    state: DispatcherState,
}

impl DispatcherServer {
    pub fn new(config: ServerConfig, dispatcher: Arc<QueryDispatcher>) -> Self {
        Self {
            config,
            state: DispatcherState { dispatcher },
        }
    }

    /// Create the Axum router with all dispatcher routes
    pub fn create_router(&self) -> Router {
        let api_router = Router::new()
            // Query dispatch
            .route("/api/ai/query", post(dispatch_query))
            .route("/api/ai/route-test", post(route_test))
            // Template browser
            .route("/api/ai/templates", get(list_templates))
            .route("/api/ai/suggestions", get(suggestions))
            // Admin
            .route("/api/ai/stats", get(stats))
            .route("/api/ai/cache/cleanup", post(cleanup_cache))
            // Health check
            .route("/health", get(health_check))
            // Fallback for unknown routes
            .fallback(not_found)
            .with_state(self.state.clone());

        if self.config.cors_enabled {
            api_router.layer(CorsLayer::permissive())
        } else {
            api_router
        }
    }

    /// Run the server
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.create_router();
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!("🎒 KinderQuery dispatcher starting");
        info!("📡 Server address: http://{}", addr);
        info!("🔗 API endpoints:");
        info!("   POST http://{}/api/ai/query", addr);
        info!("   POST http://{}/api/ai/route-test", addr);
        info!("   GET  http://{}/api/ai/templates", addr);
        info!("   GET  http://{}/api/ai/stats", addr);
        info!("   GET  http://{}/health", addr);

        axum::Server::bind(&addr.parse()?)
            .serve(app.into_make_service())
            .await?;

        Ok(())
    }
}

/// Builder pattern for the dispatcher server
pub struct DispatcherServerBuilder {
    config: ServerConfig,
    dispatcher: Option<Arc<QueryDispatcher>>,
}

impl DispatcherServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            dispatcher: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn with_host(mut self, host: String) -> Self {
        self.config.host = host;
        self
    }

    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.config.cors_enabled = enabled;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<QueryDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn build(self) -> crate::Result<DispatcherServer> {
        let dispatcher = self.dispatcher.ok_or_else(|| {
            crate::DispatchError::Configuration("server requires a dispatcher".to_string())
        })?;
        Ok(DispatcherServer::new(self.config, dispatcher))
    }
}

impl Default for DispatcherServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatcherConfig;
    use crate::fallback::ReadOnlyExecutor;
    use crate::llm::{Generation, LlmClient};
    use crate::models::ExecutionPlan;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct FixedLlm;

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn generate(&self, _prompt: &str) -> crate::Result<Generation> {
            Ok(Generation {
                text: "SELECT name FROM students LIMIT 10".to_string(),
                tokens_used: Some(10),
            })
        }

        fn provider_name(&self) -> &str {
            "fixed"
        }
    }

    struct FixedExecutor;

    #[async_trait]
    impl ReadOnlyExecutor for FixedExecutor {
        async fn execute(&self, _plan: &ExecutionPlan) -> crate::Result<Vec<Value>> {
            Ok(vec![json!({"total": 7})])
        }
    }

    fn test_server() -> DispatcherServer {
        let dispatcher = Arc::new(
            QueryDispatcher::new(
                DispatcherConfig::default(),
                Arc::new(FixedLlm),
                Arc::new(FixedExecutor),
            )
            .unwrap(),
        );
        DispatcherServerBuilder::new()
            .with_port(8080)
            .with_dispatcher(dispatcher)
            .build()
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_server().create_router();
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_query_endpoint_routes_direct() {
        let app = test_server().create_router();
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/ai/query")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"query": "学生总数", "user_id": 1, "role": "admin"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["decision"]["tier"], "direct");
        assert_eq!(body["outcome"]["status"], "done");
    }

    #[tokio::test]
    async fn test_empty_query_is_bad_request() {
        let app = test_server().create_router();
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/ai/query")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"query": "   ", "user_id": 1, "role": "admin"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_route_test_does_not_execute() {
        let app = test_server().create_router();
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/ai/route-test")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"query": "查询所有学生的基本信息", "user_id": 1, "role": "teacher"})
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["tier"], "template");
    }

    #[tokio::test]
    async fn test_templates_and_stats_endpoints() {
        let server = test_server();
        let app = server.create_router();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/api/ai/templates")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body.as_array().map(|a| !a.is_empty()).unwrap_or(false));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/api/ai/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total"], 0);
        assert_eq!(body["cache_entries"], 0);
    }

    #[tokio::test]
    async fn test_builder_requires_dispatcher() {
        assert!(DispatcherServerBuilder::new().build().is_err());
    }
}
