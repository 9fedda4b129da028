//! gRPC access logging interceptor.
//!
//! # Responsibilities
//! - Emit one event per call once its response stream has ended
//! - Log successful calls at DEBUG and failed calls at ERROR
//!
//! # Design Decisions
//! - The status comes from `grpc-status`, in headers or trailers
//! - Calls whose stream is dropped early are logged as `Cancelled`

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use http::{Request, Response};
use tonic::transport::server::TcpConnectInfo;
use tower::{Layer, Service};

use super::call::{full_method, track, CallBody, Completion, StreamingMethods};
use crate::http::request::request_id;
use crate::instrument::severity::dyn_event;
use crate::instrument::SeverityPolicy;
use crate::observability::ACCESS_LOG_TARGET;

/// Peer address tonic recorded for the connection, if any.
pub fn remote_addr<B>(request: &Request<B>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<TcpConnectInfo>()
        .and_then(TcpConnectInfo::remote_addr)
}

struct CallEntry {
    method: String,
    kind: &'static str,
    remote_ip: String,
    request_id: Option<String>,
}

impl CallEntry {
    fn emit(&self, policy: SeverityPolicy, completion: Completion) {
        let elapsed = completion.elapsed;
        let latency = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let latency_human = format!("{elapsed:?}");

        dyn_event!(
            policy.for_rpc(completion.is_ok()),
            target: ACCESS_LOG_TARGET,
            method = self.method.as_str(),
            kind = self.kind,
            status = completion.outcome(),
            code = i32::from(completion.code),
            remote_ip = self.remote_ip.as_str(),
            latency,
            latency_human = latency_human.as_str(),
            request_id = self.request_id.as_deref(),
            "{}",
            completion.code.description()
        );
    }
}

/// Wraps gRPC services to emit one access-log event per call.
#[derive(Clone, Debug, Default)]
pub struct GrpcLoggingLayer {
    policy: SeverityPolicy,
    streaming: StreamingMethods,
}

impl GrpcLoggingLayer {
    pub fn new(policy: SeverityPolicy, streaming: StreamingMethods) -> Self {
        Self { policy, streaming }
    }
}

impl<S> Layer<S> for GrpcLoggingLayer {
    type Service = GrpcLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GrpcLoggingService {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GrpcLoggingService<S> {
    inner: S,
    layer: GrpcLoggingLayer,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for GrpcLoggingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<CallBody<ResBody>>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let method = full_method(&req);
        let entry = CallEntry {
            kind: self.layer.streaming.kind(&method).as_str(),
            method,
            remote_ip: remote_addr(&req)
                .map(|addr| addr.ip().to_string())
                .unwrap_or_default(),
            request_id: request_id(req.headers()),
        };
        let policy = self.layer.policy;

        let start = Instant::now();
        let fut = self.inner.call(req);

        track(
            start,
            fut,
            Box::new(move |completion| entry.emit(policy, completion)),
        )
    }
}
