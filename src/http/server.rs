//! HTTP server setup.
//!
//! # Responsibilities
//! - Mount the service's routes next to `/metrics` and the health probes
//! - Wire up middleware (request ID, metrics, access logging)
//! - Serve with connect info and graceful shutdown
//!
//! # Design Decisions
//! - Middleware is installed with `Router::layer` so matched route
//!   templates are visible to it; unmatched requests reach the fallback
//! - Metrics are outermost so their latency includes logging

use std::future::Future;
use std::net::SocketAddr;

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::net::TcpListener;

use crate::container::Container;
use crate::health;
use crate::http::request::request_id_layers;
use crate::observability::MetricsRegistry;

/// Path the Prometheus exposition is served on.
pub const METRICS_PATH: &str = "/metrics";

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Wrap `app` with the standard endpoints and request instrumentation.
pub fn new_http_router(container: &Container, app: Router) -> Router {
    let registry = container.metrics().clone();

    let router = app
        .merge(health::router(container.probes().clone()))
        .route(METRICS_PATH, get(move || render_metrics(registry.clone())))
        .fallback(not_found)
        .layer(container.http_logging_layer())
        .layer(container.http_metrics_layer());

    if container.config().http.generate_request_id {
        let (set_id, propagate_id) = request_id_layers();
        router.layer(propagate_id).layer(set_id)
    } else {
        router
    }
}

async fn render_metrics(registry: MetricsRegistry) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        registry.render(),
    )
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// HTTP server bound to one listener.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(container: &Container, app: Router) -> Self {
        Self {
            router: new_http_router(container, app),
        }
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_metrics_endpoint_renders_registry() {
        let container = Container::isolated(ServiceConfig::default()).unwrap();
        let app = Router::new().route("/ping", get(|| async { "pong" }));
        let router = new_http_router(&container, app);

        let ping = Request::builder().uri("/ping").body(Body::empty()).unwrap();
        router.clone().oneshot(ping).await.unwrap();

        let scrape = Request::builder()
            .uri(METRICS_PATH)
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(scrape).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            PROMETHEUS_CONTENT_TYPE
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("handler=\"/ping\""));
    }
}
