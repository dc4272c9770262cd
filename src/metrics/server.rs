//! HTTP server for Prometheus metrics endpoint.

use crate::config::DEFAULT_LISTEN;
use crate::metrics::MetricsRegistry;
use crate::shutdown::wait_for_shutdown;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

/// Errors that can occur during metrics server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

/// Configuration for the metrics server.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_LISTEN
                .parse()
                .unwrap_or_else(|_| ([127, 0, 0, 1], 9099).into()),
        }
    }
}

impl MetricsServerConfig {
    /// Creates a config bound to `addr`.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self { bind_addr }
    }
}

/// HTTP server for exposing Prometheus metrics.
pub struct MetricsServer {
    config: MetricsServerConfig,
    registry: Arc<MetricsRegistry>,
}

/// Builds the metrics router.
pub fn router(registry: Arc<MetricsRegistry>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(registry)
}

impl MetricsServer {
    /// Creates a new metrics server.
    pub fn new(config: MetricsServerConfig, registry: Arc<MetricsRegistry>) -> Self {
        Self { config, registry }
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        Ok(TcpListener::bind(self.config.bind_addr).await?)
    }

    /// Serves scrapes on `listener` until `shutdown` flips to true.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Metrics server listening");

        axum::serve(listener, router(self.registry))
            .with_graceful_shutdown(async move {
                wait_for_shutdown(shutdown).await;
                tracing::info!("Metrics server shutting down");
            })
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        Ok(())
    }
}

/// Handler for the /metrics endpoint.
async fn metrics_handler(State(registry): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    match registry.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Observation;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn make_registry() -> Arc<MetricsRegistry> {
        Arc::new(MetricsRegistry::new().unwrap())
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = MetricsServerConfig::default();
        assert_eq!(config.bind_addr.port(), 9099);
        assert!(config.bind_addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_metrics_endpoint_before_first_poll() {
        let response = router(make_registry())
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("version=0.0.4"));

        let body = body_text(response).await;
        assert!(body.contains("earthcoin_block_count_total 0"));
        assert!(body.contains("earthcoin_subsidy 0"));
        assert!(body.contains("earthcoin_network_hashes_per_second 0"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint_reflects_update() {
        let registry = make_registry();
        registry.update(&Observation {
            block_count: 77,
            subsidy: 5000,
            connection_count: 4,
            difficulty: 2.25,
            hashes_per_second: 10.0,
            network_hashes_per_second: 3e6,
        });

        let response = router(registry)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_text(response).await;

        assert!(body.contains("earthcoin_block_count_total 77"));
        assert!(body.contains("earthcoin_subsidy 5000"));
        assert!(body.contains("earthcoin_connection_count 4"));
        assert!(body.contains("earthcoin_difficulty 2.25"));
        assert!(body.contains("earthcoin_hashes_per_second 10"));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = router(make_registry())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_path_not_found() {
        let response = router(make_registry())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let held = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = held.local_addr().unwrap();

        let server = MetricsServer::new(MetricsServerConfig::new(addr), make_registry());
        assert!(matches!(server.bind().await, Err(ServerError::Bind(_))));
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let server = MetricsServer::new(
            MetricsServerConfig::new(([127, 0, 0, 1], 0).into()),
            make_registry(),
        );
        let listener = server.bind().await.unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(server.serve(listener, rx));

        tx.send(true).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("server should stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
