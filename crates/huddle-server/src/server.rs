//! `HuddleServer`: axum router and listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::TokenValidator;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handlers;
use crate::realtime::ConnectionRegistry;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Attached realtime clients.
    pub registry: Arc<ConnectionRegistry>,
    /// Credential check for `/events`.
    pub validator: Arc<dyn TokenValidator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The realtime server.
pub struct HuddleServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    validator: Arc<dyn TokenValidator>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl HuddleServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, validator: Arc<dyn TokenValidator>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.registry_config()));
        Self {
            config,
            registry,
            validator,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            validator: Arc::clone(&self.validator),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/events", get(handlers::events))
            .route("/events/stats", get(handlers::stats))
            .route("/events/{client_id}/subscribe", post(handlers::subscribe))
            .route("/events/{client_id}/unsubscribe", post(handlers::unsubscribe))
            .route("/health", get(handlers::health))
            .route("/metrics", get(handlers::metrics))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in a background task.
    ///
    /// The task stops accepting once the shutdown coordinator fires, and the
    /// registry is shut down so that every open event stream ends.
    pub async fn listen(
        &self,
    ) -> Result<(SocketAddr, JoinHandle<Result<(), ServerError>>), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr())
            .await
            .map_err(ServerError::Bind)?;
        let addr = listener.local_addr().map_err(ServerError::Bind)?;
        info!(%addr, "realtime server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let registry = Arc::clone(&self.registry);
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    token.cancelled().await;
                    info!("shutting down realtime server");
                    registry.shutdown();
                })
                .await
                .map_err(ServerError::Serve)
        });
        Ok((addr, handle))
    }

    /// Connection registry; publish events through it.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AllowListValidator;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use futures::StreamExt;
    use huddle_core::decode_data;
    use tower::ServiceExt;

    fn make_server() -> HuddleServer {
        make_server_with(ServerConfig::default())
    }

    fn make_server_with(config: ServerConfig) -> HuddleServer {
        HuddleServer::new(config, Arc::new(AllowListValidator::new(["secret"])))
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_topic(uri: &str, token: Option<&str>, topic: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
            .body(Body::from(serde_json::json!({ "topic": topic }).to_string()))
            .unwrap()
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert_eq!(server.registry().client_count(), 0);
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let resp = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = json_body(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["topics"], 0);
    }

    #[tokio::test]
    async fn health_reports_topic_fan_out() {
        let server = make_server();
        let (_a, _rx_a) = server
            .registry()
            .open(["match:1".to_owned(), "*".to_owned()].into_iter().collect())
            .unwrap();
        let (_b, _rx_b) = server
            .registry()
            .open(["match:1".to_owned(), "payments".to_owned()].into_iter().collect())
            .unwrap();

        let resp = server.router().oneshot(get("/health")).await.unwrap();
        let parsed = json_body(resp).await;
        assert_eq!(parsed["connections"], 2);
        assert_eq!(parsed["topics"], 2);
        assert_eq!(parsed["wildcard_subscribers"], 1);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let resp = app.oneshot(get("/nonexistent")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn events_without_token_is_401() {
        let app = make_server().router();
        let resp = app.oneshot(get("/events?subscribe=a")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(resp).await["error"], "MISSING_TOKEN");
    }

    #[tokio::test]
    async fn events_with_bad_token_is_401() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(get("/events?subscribe=a&token=wrong"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(server.registry().client_count(), 0);
    }

    #[tokio::test]
    async fn events_streams_handshake() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(get("/events?subscribe=match:42,payments&token=secret"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(resp.headers()["x-accel-buffering"], "no");
        assert_eq!(server.registry().client_count(), 1);

        let mut body = resp.into_body().into_data_stream();
        let chunk = body.next().await.unwrap().unwrap();
        let text = std::str::from_utf8(&chunk).unwrap();
        let data = text.trim_end().strip_prefix("data: ").unwrap();
        let frame = decode_data(data).unwrap();
        assert_eq!(frame.event_type, "connected");
        assert_eq!(
            frame.field("subscriptions"),
            Some(&serde_json::json!(["match:42", "payments"]))
        );

        drop(body);
        assert_eq!(server.registry().client_count(), 0);
    }

    #[tokio::test]
    async fn events_accepts_bearer_header() {
        let server = make_server();
        let req = Request::builder()
            .uri("/events")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn events_at_limit_is_503() {
        let server = make_server_with(ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        });
        let first = server
            .router()
            .oneshot(get("/events?token=secret"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = server
            .router()
            .oneshot(get("/events?token=secret"))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
        drop(first);
    }

    #[tokio::test]
    async fn subscribe_endpoint_mutates_registry() {
        let server = make_server();
        let (id, _rx) = server.registry().open(Default::default()).unwrap();

        let uri = format!("/events/{id}/subscribe");
        let resp = server
            .router()
            .oneshot(post_topic(&uri, Some("secret"), "payments"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["subscribed"], true);
        assert_eq!(server.registry().subscription_stats().get("payments"), Some(&1));

        let uri = format!("/events/{id}/unsubscribe");
        let resp = server
            .router()
            .oneshot(post_topic(&uri, Some("secret"), "payments"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(server.registry().subscription_stats().is_empty());
    }

    #[tokio::test]
    async fn subscribe_unknown_client_is_404() {
        let app = make_server().router();
        let resp = app
            .oneshot(post_topic("/events/ghost/subscribe", Some("secret"), "a"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(resp).await["error"], "UNKNOWN_CLIENT");
    }

    #[tokio::test]
    async fn subscribe_requires_token() {
        let app = make_server().router();
        let resp = app
            .oneshot(post_topic("/events/ghost/subscribe", None, "a"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn subscribe_empty_topic_is_400() {
        let server = make_server();
        let (id, _rx) = server.registry().open(Default::default()).unwrap();
        let resp = server
            .router()
            .oneshot(post_topic(&format!("/events/{id}/subscribe"), Some("secret"), "  "))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stats_endpoint_reports_topics() {
        let server = make_server();
        let (_a, _rx_a) = server
            .registry()
            .open(["x".to_owned(), "*".to_owned()].into_iter().collect())
            .unwrap();
        let (_b, _rx_b) = server.registry().open(["x".to_owned()].into_iter().collect()).unwrap();

        let resp = server.router().oneshot(get("/events/stats")).await.unwrap();
        let parsed = json_body(resp).await;
        assert_eq!(parsed["clients"], 2);
        assert_eq!(parsed["topics"]["x"], 2);
        assert_eq!(parsed["topics"]["*"], 1);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_handle() {
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        let server = make_server().with_metrics(handle);
        let resp = server.router().oneshot(get("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn listen_and_graceful_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server
            .shutdown()
            .graceful_shutdown(handle, Some(std::time::Duration::from_secs(5)))
            .await;
        assert!(server.shutdown().is_shutting_down());
    }
}
