//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request middleware (http/, grpc/) produces:
//!     → logging.rs (structured access log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape at /metrics)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows into access logs when the client sends one
//! - Metrics are cheap (atomic increments on registered handles)

pub mod logging;
pub mod metrics;

pub use self::logging::{init_logging, ACCESS_LOG_TARGET};
pub use self::metrics::{MetricDescriptor, MetricKind, MetricsError, MetricsRegistry};
