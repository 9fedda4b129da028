//! HTTP metrics middleware.
//!
//! Records `<ns>_<sub>_requests_total{status, method, handler}` and
//! `<ns>_<sub>_request_duration_seconds{method, handler}` for every request.
//! Install with `Router::layer` so the matched route template is visible;
//! requests that reach the fallback are recorded under `/not-found`.

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use tower::{Layer, Service};

use crate::config::{HttpConfig, MetricsConfig};
use crate::instrument::{CallLabels, CallMetrics, RequestInstrumentor, NOT_FOUND_ROUTE};
use crate::observability::MetricDescriptor;

/// Counter and histogram descriptors for HTTP requests.
pub fn descriptors(http: &HttpConfig, metrics: &MetricsConfig) -> CallMetrics {
    CallMetrics {
        requests: MetricDescriptor::counter("requests_total", "Number of HTTP operations")
            .with_namespace(&http.namespace)
            .with_subsystem(&http.subsystem)
            .with_labels(&["status", "method", "handler"]),
        duration: MetricDescriptor::histogram(
            "request_duration_seconds",
            "Time spent processing a route",
            &metrics.duration_buckets,
        )
        .with_namespace(&http.namespace)
        .with_subsystem(&http.subsystem)
        .with_labels(&["method", "handler"]),
    }
}

/// Route template the router matched, or the not-found sentinel.
///
/// Raw paths of unmatched requests are client-controlled, so they never
/// become label values.
pub fn route_label<B>(request: &Request<B>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| NOT_FOUND_ROUTE.to_owned(), |matched| matched.as_str().to_owned())
}

struct HttpCall<'a> {
    method: &'a str,
    route: &'a str,
    status: u16,
}

impl CallLabels for HttpCall<'_> {
    fn method_label(&self) -> Option<&str> {
        Some(self.method)
    }

    fn route_label(&self) -> &str {
        self.route
    }

    fn outcome_label(&self) -> Cow<'_, str> {
        Cow::Owned(self.status.to_string())
    }
}

/// Wraps HTTP services to record request counts and latency per route.
#[derive(Clone, Debug)]
pub struct HttpMetricsLayer {
    instrumentor: RequestInstrumentor,
}

impl HttpMetricsLayer {
    pub fn new(instrumentor: RequestInstrumentor) -> Self {
        Self { instrumentor }
    }
}

impl<S> Layer<S> for HttpMetricsLayer {
    type Service = HttpMetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpMetricsService {
            inner,
            instrumentor: self.instrumentor.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HttpMetricsService<S> {
    inner: S,
    instrumentor: RequestInstrumentor,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for HttpMetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let method = req.method().as_str().to_owned();
        let route = route_label(&req);
        let instrumentor = self.instrumentor.clone();

        let start = Instant::now();
        let fut = self.inner.call(req);

        Box::pin(async move {
            let result = fut.await;
            let elapsed = start.elapsed();

            // An inner error never became a response; count it as a 500.
            let status = result
                .as_ref()
                .map_or(500, |response| response.status().as_u16());

            instrumentor.observe(
                &HttpCall {
                    method: &method,
                    route: &route,
                    status,
                },
                elapsed,
            );
            result
        })
    }
}
