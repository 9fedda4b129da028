//! gRPC metrics interceptor.
//!
//! Unary calls record `<ns>_unary_requests_total{status, method}` and
//! `<ns>_unary_request_duration_seconds{method}`; streams record the
//! `<ns>_stream_*` pair. `status` is `ok` or `err`, `method` the
//! fully-qualified RPC path. Durations run until the response stream ends.

use std::borrow::Cow;
use std::task::{Context, Poll};
use std::time::Instant;

use http::{Request, Response};
use tower::{Layer, Service};

use super::call::{full_method, track, CallBody, Completion, StreamingMethods};
use crate::config::{GrpcConfig, MetricsConfig};
use crate::instrument::{CallLabels, CallMetrics, RequestInstrumentor, TransportKind};
use crate::observability::MetricDescriptor;

/// Counter and histogram descriptors for unary calls and for streams.
pub fn descriptors(grpc: &GrpcConfig, metrics: &MetricsConfig) -> (CallMetrics, CallMetrics) {
    let pair = |shape: &str, duration_help: &str| CallMetrics {
        requests: MetricDescriptor::counter(
            "requests_total",
            format!("Number of {shape} operations"),
        )
        .with_namespace(&grpc.namespace)
        .with_subsystem(shape)
        .with_labels(&["status", "method"]),
        duration: MetricDescriptor::histogram(
            "request_duration_seconds",
            duration_help,
            &metrics.duration_buckets,
        )
        .with_namespace(&grpc.namespace)
        .with_subsystem(shape)
        .with_labels(&["method"]),
    };

    (
        pair("unary", "Time spent processing a unary request"),
        pair("stream", "Time spent processing a stream request"),
    )
}

/// A finished RPC as seen by the instrumentor.
pub struct RpcCall<'a> {
    pub method: &'a str,
    pub completion: Completion,
}

impl CallLabels for RpcCall<'_> {
    fn method_label(&self) -> Option<&str> {
        None
    }

    fn route_label(&self) -> &str {
        self.method
    }

    fn outcome_label(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.completion.outcome())
    }
}

/// Records gRPC call counts and latency, split by unary and stream.
#[derive(Clone, Debug)]
pub struct GrpcMetricsLayer {
    unary: RequestInstrumentor,
    stream: RequestInstrumentor,
    streaming: StreamingMethods,
}

impl GrpcMetricsLayer {
    pub fn new(
        unary: RequestInstrumentor,
        stream: RequestInstrumentor,
        streaming: StreamingMethods,
    ) -> Self {
        Self {
            unary,
            stream,
            streaming,
        }
    }

    fn instrumentor(&self, kind: TransportKind) -> &RequestInstrumentor {
        match kind {
            TransportKind::RpcStream => &self.stream,
            _ => &self.unary,
        }
    }
}

impl<S> Layer<S> for GrpcMetricsLayer {
    type Service = GrpcMetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GrpcMetricsService {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GrpcMetricsService<S> {
    inner: S,
    layer: GrpcMetricsLayer,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for GrpcMetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<CallBody<ResBody>>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let method = full_method(&req);
        let kind = self.layer.streaming.kind(&method);
        let instrumentor = self.layer.instrumentor(kind).clone();

        let start = Instant::now();
        let fut = self.inner.call(req);

        track(
            start,
            fut,
            Box::new(move |completion| {
                instrumentor.observe(
                    &RpcCall {
                        method: &method,
                        completion,
                    },
                    completion.elapsed,
                );
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::sample;
    use crate::observability::MetricsRegistry;
    use axum::body::Bytes;
    use http_body_util::{BodyExt, Full};
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};

    fn layer(streaming: &[&str]) -> (GrpcMetricsLayer, MetricsRegistry) {
        let (unary, stream) = descriptors(&GrpcConfig::default(), &MetricsConfig::default());
        let all: Vec<_> = unary
            .descriptors()
            .into_iter()
            .chain(stream.descriptors())
            .collect();
        let registry = MetricsRegistry::isolated(&all).unwrap();
        let layer = GrpcMetricsLayer::new(
            RequestInstrumentor::new(TransportKind::RpcUnary, registry.clone(), &unary).unwrap(),
            RequestInstrumentor::new(TransportKind::RpcStream, registry.clone(), &stream).unwrap(),
            StreamingMethods::new(streaming.iter().copied()),
        );
        (layer, registry)
    }

    #[test]
    fn test_descriptor_names() {
        let (unary, stream) = descriptors(&GrpcConfig::default(), &MetricsConfig::default());
        assert_eq!(unary.requests.fq_name(), "grpc_unary_requests_total");
        assert_eq!(unary.duration.fq_name(), "grpc_unary_request_duration_seconds");
        assert_eq!(stream.requests.fq_name(), "grpc_stream_requests_total");
        assert_eq!(stream.requests.help, "Number of stream operations");
    }

    #[tokio::test]
    async fn test_trailers_only_error_is_counted_as_err() {
        let (layer, registry) = layer(&[]);
        let svc = layer.layer(service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(
                Response::builder()
                    .header("grpc-status", "5")
                    .body(Full::new(Bytes::new()))
                    .unwrap(),
            )
        }));

        let req = Request::builder()
            .uri("/users.Users/Get")
            .body(())
            .unwrap();
        let response = svc.oneshot(req).await.unwrap();
        response.into_body().collect().await.unwrap();

        let rendered = registry.render();
        assert_eq!(
            sample(
                &rendered,
                "grpc_unary_requests_total",
                &[("status", "err"), ("method", "/users.Users/Get")]
            ),
            Some(1.0)
        );
        assert!(!rendered.contains("grpc_stream_requests_total{"));
    }
}
