//! Request instrumentation for HTTP and gRPC services.
//!
//! Every request gets a latency histogram observation, a request counter
//! increment labelled with its outcome, and one structured access-log event,
//! regardless of the transport it arrived on.

pub mod config;
pub mod container;
pub mod grpc;
pub mod health;
pub mod http;
pub mod instrument;
pub mod lifecycle;
pub mod observability;

pub use config::ServiceConfig;
pub use container::{Container, ContainerError};
pub use grpc::new_grpc_server;
pub use http::{new_http_router, HttpServer};
pub use lifecycle::Shutdown;
