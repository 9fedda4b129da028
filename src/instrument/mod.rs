//! Transport-agnostic request instrumentation.
//!
//! # Data Flow
//! ```text
//! transport middleware (http/, grpc/)
//!     → start = Instant::now()
//!     → inner handler runs (result kept untouched)
//!     → adapter describes the call via CallLabels
//!     → RequestInstrumentor::observe
//!         → histogram{method?, route}.record(elapsed)
//!         → counter{outcome, method?, route}.increment(1)
//!     → result returned to the caller as-is
//! ```
//!
//! # Design Decisions
//! - One instrumentor for every transport; adapters only provide labels
//! - Outcome is a counter label but never a duration label
//! - Label arity is checked once at construction, not per request

pub mod severity;

use std::borrow::Cow;
use std::iter;
use std::sync::Arc;
use std::time::Duration;

use metrics::Label;

use crate::observability::metrics::{MetricDescriptor, MetricKind, MetricsRegistry};

pub use severity::SeverityPolicy;

/// Route label recorded for requests that matched no route.
pub const NOT_FOUND_ROUTE: &str = "/not-found";

/// Call shape being instrumented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Http,
    RpcUnary,
    RpcStream,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Http => "http",
            TransportKind::RpcUnary => "unary",
            TransportKind::RpcStream => "stream",
        }
    }

    /// HTTP carries a request method; RPC calls are identified by route alone.
    fn has_method_label(self) -> bool {
        matches!(self, TransportKind::Http)
    }

    fn duration_arity(self) -> usize {
        if self.has_method_label() {
            2
        } else {
            1
        }
    }

    fn requests_arity(self) -> usize {
        self.duration_arity() + 1
    }
}

/// What a transport adapter knows about a finished call.
pub trait CallLabels {
    /// Request method (e.g. `GET`), or `None` when the transport has none.
    fn method_label(&self) -> Option<&str>;

    /// Matched route template or fully-qualified RPC method.
    fn route_label(&self) -> &str;

    /// Status code for HTTP, `ok`/`err` for RPC.
    fn outcome_label(&self) -> Cow<'_, str>;
}

/// Errors raised when descriptors do not fit a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstrumentError {
    #[error("{metric}: expected a {expected:?} metric")]
    WrongKind { metric: String, expected: MetricKind },

    #[error("{metric}: {transport} calls need {expected} labels, descriptor has {found}")]
    LabelArity {
        metric: String,
        transport: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Request counter and duration histogram for one call shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CallMetrics {
    pub requests: MetricDescriptor,
    pub duration: MetricDescriptor,
}

impl CallMetrics {
    pub fn descriptors(&self) -> [MetricDescriptor; 2] {
        [self.requests.clone(), self.duration.clone()]
    }
}

/// Records one counter increment and one latency observation per call.
#[derive(Clone)]
pub struct RequestInstrumentor {
    inner: Arc<Inner>,
}

struct Inner {
    kind: TransportKind,
    registry: MetricsRegistry,
    requests_name: String,
    requests_labels: Vec<&'static str>,
    duration_name: String,
    duration_labels: Vec<&'static str>,
}

impl RequestInstrumentor {
    /// Bind a request counter and a duration histogram for `kind` calls.
    ///
    /// Counter labels are `[outcome, method?, route]`, histogram labels
    /// `[method?, route]`, where `method` only exists for HTTP.
    pub fn new(
        kind: TransportKind,
        registry: MetricsRegistry,
        metrics: &CallMetrics,
    ) -> Result<Self, InstrumentError> {
        let CallMetrics { requests, duration } = metrics;
        check(requests, MetricKind::Counter, kind, kind.requests_arity())?;
        check(duration, MetricKind::Histogram, kind, kind.duration_arity())?;

        Ok(Self {
            inner: Arc::new(Inner {
                kind,
                registry,
                requests_name: requests.fq_name(),
                requests_labels: requests.labels.clone(),
                duration_name: duration.fq_name(),
                duration_labels: duration.labels.clone(),
            }),
        })
    }

    pub fn kind(&self) -> TransportKind {
        self.inner.kind
    }

    /// Report a finished call that took `elapsed`.
    pub fn observe<C: CallLabels + ?Sized>(&self, call: &C, elapsed: Duration) {
        let inner = &self.inner;
        let outcome = call.outcome_label();
        let dimensions: Vec<&str> = call
            .method_label()
            .into_iter()
            .chain(iter::once(call.route_label()))
            .collect();

        inner
            .registry
            .histogram(
                &inner.duration_name,
                zip_labels(&inner.duration_labels, dimensions.iter().copied()),
            )
            .record(elapsed.as_secs_f64());

        inner
            .registry
            .counter(
                &inner.requests_name,
                zip_labels(
                    &inner.requests_labels,
                    iter::once(outcome.as_ref()).chain(dimensions.iter().copied()),
                ),
            )
            .increment(1);
    }
}

impl std::fmt::Debug for RequestInstrumentor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestInstrumentor")
            .field("kind", &self.inner.kind)
            .field("requests", &self.inner.requests_name)
            .field("duration", &self.inner.duration_name)
            .finish()
    }
}

fn check(
    descriptor: &MetricDescriptor,
    expected_kind: MetricKind,
    transport: TransportKind,
    expected: usize,
) -> Result<(), InstrumentError> {
    if descriptor.kind != expected_kind {
        return Err(InstrumentError::WrongKind {
            metric: descriptor.fq_name(),
            expected: expected_kind,
        });
    }
    if descriptor.labels.len() != expected {
        return Err(InstrumentError::LabelArity {
            metric: descriptor.fq_name(),
            transport: transport.as_str(),
            expected,
            found: descriptor.labels.len(),
        });
    }
    Ok(())
}

fn zip_labels<'a>(names: &[&'static str], values: impl Iterator<Item = &'a str>) -> Vec<Label> {
    names
        .iter()
        .zip(values)
        .map(|(name, value)| Label::new(*name, value.to_owned()))
        .collect()
}
