//! gRPC server construction.

use tonic::transport::Server;
use tower::layer::util::{Identity, Stack};

use super::logging::GrpcLoggingLayer;
use super::metrics::GrpcMetricsLayer;
use crate::container::Container;

/// tonic server builder with metrics and access logging installed.
pub type GrpcServer = Server<Stack<GrpcLoggingLayer, Stack<GrpcMetricsLayer, Identity>>>;

/// Server builder every service of `container` is added to.
///
/// Metrics wrap logging, so both observe the same completion.
pub fn new_grpc_server(container: &Container) -> GrpcServer {
    Server::builder()
        .layer(container.grpc_metrics_layer())
        .layer(container.grpc_logging_layer())
}
