//! gRPC instrumentation subsystem.
//!
//! # Data Flow
//! ```text
//! tonic transport
//!     → GrpcMetricsLayer (classify unary/stream by method path, start timer)
//!     → GrpcLoggingLayer (capture method, peer, request id)
//!     → service handler → response headers
//!     → CallBody wraps the response stream
//!     → end of stream / trailers / drop
//!         → counter{status, method} + histogram{method}
//!         → access log event (DEBUG ok, ERROR otherwise)
//! ```
//!
//! # Design Decisions
//! - A call lasts until its response stream ends, not until headers
//! - Streaming methods are declared in configuration
//! - The only outcomes are `ok` and `err`; the exact code is logged

pub mod call;
pub mod logging;
pub mod metrics;
pub mod server;

pub use call::{CallBody, Completion, StreamingMethods};
pub use logging::GrpcLoggingLayer;
pub use metrics::{GrpcMetricsLayer, RpcCall};
pub use server::{new_grpc_server, GrpcServer};
