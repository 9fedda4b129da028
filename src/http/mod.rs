//! HTTP instrumentation subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, connect info)
//!     → [SetRequestId → PropagateRequestId] when enabled
//!     → metrics.rs (route template, status, latency)
//!     → logging.rs (one access-log event per request)
//!     → application routes, /metrics, /healthz, or the 404 fallback
//! ```

pub mod logging;
pub mod metrics;
pub mod request;
pub mod server;

pub use logging::{ErrorMessage, HttpLoggingLayer};
pub use metrics::HttpMetricsLayer;
pub use request::X_REQUEST_ID;
pub use server::{new_http_router, HttpServer, METRICS_PATH};
