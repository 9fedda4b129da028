//! Lifetime tracking for a single gRPC call.
//!
//! A gRPC call ends when its response body ends, not when the handler
//! returns response headers: unary responses carry the status in trailers
//! and streams keep sending messages long after the headers. `CallBody`
//! wraps the response body and reports exactly once, on the first of:
//! trailers-only headers, the trailers frame, end of stream, body error,
//! or drop.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use http::{HeaderMap, Request, Response};
use http_body::{Body as HttpBody, Frame, SizeHint};
use tonic::Code;

use crate::instrument::TransportKind;

const GRPC_STATUS: &str = "grpc-status";

/// Fully-qualified method paths that are streaming calls.
#[derive(Clone, Debug, Default)]
pub struct StreamingMethods {
    methods: Arc<HashSet<String>>,
}

impl StreamingMethods {
    pub fn new<I, M>(methods: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        Self {
            methods: Arc::new(methods.into_iter().map(Into::into).collect()),
        }
    }

    /// Call shape of `path`; anything not declared as streaming is unary.
    pub fn kind(&self, path: &str) -> TransportKind {
        if self.methods.contains(path) {
            TransportKind::RpcStream
        } else {
            TransportKind::RpcUnary
        }
    }
}

/// Fully-qualified method of a gRPC request (`/package.Service/Method`).
pub fn full_method<B>(request: &Request<B>) -> String {
    request.uri().path().to_owned()
}

/// How and when a call finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub code: Code,
    pub elapsed: Duration,
}

impl Completion {
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    pub fn outcome(&self) -> &'static str {
        if self.is_ok() {
            "ok"
        } else {
            "err"
        }
    }
}

/// `grpc-status` carried by a header or trailer map.
pub fn grpc_code(headers: &HeaderMap) -> Option<Code> {
    headers
        .get(GRPC_STATUS)
        .map(|value| Code::from_bytes(value.as_bytes()))
}

type OnComplete = Box<dyn FnOnce(Completion) + Send>;

struct CallTracker {
    start: Instant,
    code: Code,
    on_complete: OnComplete,
}

impl CallTracker {
    fn finish(self, code: Code) {
        (self.on_complete)(Completion {
            code,
            elapsed: self.start.elapsed(),
        });
    }
}

/// Response body that reports the call's completion when the stream ends.
pub struct CallBody<B> {
    inner: Pin<Box<B>>,
    tracker: Option<CallTracker>,
}

impl<B> CallBody<B> {
    fn finish(&mut self, code: Option<Code>) {
        if let Some(tracker) = self.tracker.take() {
            let code = code.unwrap_or(tracker.code);
            tracker.finish(code);
        }
    }
}

impl<B> Drop for CallBody<B> {
    fn drop(&mut self) {
        // Dropped before the stream ended: the client went away.
        self.finish(Some(Code::Cancelled));
    }
}

impl<B: HttpBody> HttpBody for CallBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = this.inner.as_mut().poll_frame(cx);

        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                // Trailers are terminal; the server drops the body right
                // after sending them, without polling for the end.
                if let Some(trailers) = frame.trailers_ref() {
                    let code = grpc_code(trailers).unwrap_or(Code::Unknown);
                    this.finish(Some(code));
                } else if this.inner.is_end_stream() {
                    this.finish(None);
                }
            }
            Poll::Ready(Some(Err(_))) => this.finish(Some(Code::Unknown)),
            Poll::Ready(None) => this.finish(None),
            Poll::Pending => {}
        }

        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> std::fmt::Debug for CallBody<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallBody")
            .field("finished", &self.tracker.is_none())
            .finish()
    }
}

/// Await the response of a call started at `start` and wrap its body so
/// `on_complete` runs once when the call ends.
pub(crate) fn track<F, B, E>(
    start: Instant,
    response: F,
    on_complete: OnComplete,
) -> Pin<Box<dyn Future<Output = Result<Response<CallBody<B>>, E>> + Send>>
where
    F: Future<Output = Result<Response<B>, E>> + Send + 'static,
    B: Send + 'static,
    E: Send + 'static,
{
    Box::pin(async move {
        match response.await {
            Ok(response) => {
                let header_code = grpc_code(response.headers());
                let tracker = CallTracker {
                    start,
                    code: header_code.unwrap_or(Code::Ok),
                    on_complete,
                };
                Ok(response.map(|body| {
                    let mut body = CallBody {
                        inner: Box::pin(body),
                        tracker: Some(tracker),
                    };
                    // Trailers-only response: the status is already final.
                    if let Some(code) = header_code {
                        body.finish(Some(code));
                    }
                    body
                }))
            }
            Err(err) => {
                CallTracker {
                    start,
                    code: Code::Unknown,
                    on_complete,
                }
                .finish(Code::Unknown);
                Err(err)
            }
        }
    })
}
