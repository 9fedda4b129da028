//! HTTP access logging middleware.
//!
//! # Responsibilities
//! - Emit one structured event per request after the handler finished
//! - Pick the level from the response status band
//! - Carry the client's correlation id when one was sent
//!
//! # Design Decisions
//! - The inner result is returned untouched, errors included
//! - Handlers attach an `ErrorMessage` extension to explain failures;
//!   otherwise the message is derived from the status
//! - Outbound size comes from the body size hint or `content-length`

use std::borrow::Cow;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::http::{header, Request, Response, StatusCode};
use http_body::Body as HttpBody;
use tower::{Layer, Service};

use crate::http::request::{content_length, header_str, real_ip, request_id};
use crate::instrument::severity::dyn_event;
use crate::instrument::SeverityPolicy;
use crate::observability::ACCESS_LOG_TARGET;

/// Error description a handler attaches to its response for the access log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage(pub String);

impl ErrorMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Access-log message for a finished request.
pub fn status_message(status: u16, error: Option<&str>) -> Cow<'_, str> {
    if let Some(error) = error {
        return Cow::Borrowed(error);
    }
    match status {
        300..=399 => Cow::Borrowed("redirect"),
        400.. => Cow::Borrowed(
            StatusCode::from_u16(status)
                .ok()
                .and_then(|code| code.canonical_reason())
                .unwrap_or("error"),
        ),
        _ => Cow::Borrowed("success"),
    }
}

/// Request-side fields captured before the handler consumes the request.
#[derive(Debug)]
struct RequestEntry {
    remote_ip: String,
    host: String,
    user_agent: String,
    uri: String,
    method: String,
    path: String,
    referer: String,
    bytes_in: u64,
    request_id: Option<String>,
}

impl RequestEntry {
    fn capture<B>(req: &Request<B>) -> Self {
        let headers = req.headers();
        let host = header_str(headers, &header::HOST)
            .map(str::to_owned)
            .or_else(|| req.uri().authority().map(ToString::to_string))
            .unwrap_or_default();

        Self {
            remote_ip: real_ip(req).unwrap_or_default(),
            host,
            user_agent: header_str(headers, &header::USER_AGENT)
                .unwrap_or_default()
                .to_owned(),
            uri: req.uri().to_string(),
            method: req.method().as_str().to_owned(),
            path: req.uri().path().to_owned(),
            referer: header_str(headers, &header::REFERER)
                .unwrap_or_default()
                .to_owned(),
            bytes_in: content_length(headers),
            request_id: request_id(headers),
        }
    }

    fn emit(
        &self,
        policy: SeverityPolicy,
        status: u16,
        bytes_out: u64,
        error: Option<&str>,
        elapsed: Duration,
    ) {
        let message = status_message(status, error);
        let latency = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let latency_human = format!("{elapsed:?}");

        dyn_event!(
            policy.for_status(status),
            target: ACCESS_LOG_TARGET,
            remote_ip = self.remote_ip.as_str(),
            host = self.host.as_str(),
            status,
            user_agent = self.user_agent.as_str(),
            uri = self.uri.as_str(),
            method = self.method.as_str(),
            path = self.path.as_str(),
            referer = self.referer.as_str(),
            latency,
            latency_human = latency_human.as_str(),
            bytes_in = self.bytes_in,
            bytes_out,
            request_id = self.request_id.as_deref(),
            "{}",
            message
        );
    }
}

fn bytes_out<B: HttpBody>(response: &Response<B>) -> u64 {
    response
        .body()
        .size_hint()
        .exact()
        .unwrap_or_else(|| content_length(response.headers()))
}

/// Wraps HTTP services to emit one access-log event per request.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpLoggingLayer {
    policy: SeverityPolicy,
}

impl HttpLoggingLayer {
    pub fn new(policy: SeverityPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for HttpLoggingLayer {
    type Service = HttpLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpLoggingService {
            inner,
            policy: self.policy,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HttpLoggingService<S> {
    inner: S,
    policy: SeverityPolicy,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for HttpLoggingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Display + Send + 'static,
    ResBody: HttpBody + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let entry = RequestEntry::capture(&req);
        let policy = self.policy;

        let start = Instant::now();
        let fut = self.inner.call(req);

        Box::pin(async move {
            let result = fut.await;
            let elapsed = start.elapsed();

            match &result {
                Ok(response) => {
                    let error = response
                        .extensions()
                        .get::<ErrorMessage>()
                        .map(|ErrorMessage(message)| message.as_str());
                    entry.emit(
                        policy,
                        response.status().as_u16(),
                        bytes_out(response),
                        error,
                        elapsed,
                    );
                }
                Err(err) => {
                    let message = err.to_string();
                    entry.emit(policy, 500, 0, Some(&message), elapsed);
                }
            }
            result
        })
    }
}
