//! Dependency container shared by both servers.
//!
//! # Responsibilities
//! - Own the validated configuration
//! - Own the metrics registry with every request metric registered
//! - Hand out instrumentors and middleware layers for HTTP and gRPC
//! - Own the readiness flag served by the health probes
//!
//! # Design Decisions
//! - Everything is built once at startup; request paths only clone handles
//! - `isolated` keeps metrics private to the container, for tests and for
//!   running several services in one process

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::grpc::{GrpcLoggingLayer, GrpcMetricsLayer, StreamingMethods};
use crate::health::Probes;
use crate::http::logging::HttpLoggingLayer;
use crate::http::metrics::HttpMetricsLayer;
use crate::instrument::{
    CallMetrics, InstrumentError, RequestInstrumentor, SeverityPolicy, TransportKind,
};
use crate::observability::{MetricDescriptor, MetricsError, MetricsRegistry};

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("metrics: {0}")]
    Metrics(#[from] MetricsError),

    #[error("instrumentation: {0}")]
    Instrument(#[from] InstrumentError),
}

/// Request metric families for every transport.
struct Families {
    http: CallMetrics,
    grpc_unary: CallMetrics,
    grpc_stream: CallMetrics,
}

impl Families {
    fn new(config: &ServiceConfig) -> Self {
        let http = crate::http::metrics::descriptors(&config.http, &config.metrics);
        let (grpc_unary, grpc_stream) =
            crate::grpc::metrics::descriptors(&config.grpc, &config.metrics);
        Self {
            http,
            grpc_unary,
            grpc_stream,
        }
    }

    fn all(&self) -> Vec<MetricDescriptor> {
        [&self.http, &self.grpc_unary, &self.grpc_stream]
            .into_iter()
            .flat_map(CallMetrics::descriptors)
            .collect()
    }
}

/// Shared handles built from a [`ServiceConfig`].
#[derive(Clone, Debug)]
pub struct Container {
    config: Arc<ServiceConfig>,
    metrics: MetricsRegistry,
    probes: Probes,
    severity: SeverityPolicy,
    streaming: StreamingMethods,
    http: RequestInstrumentor,
    grpc_unary: RequestInstrumentor,
    grpc_stream: RequestInstrumentor,
}

impl Container {
    /// Build the container and install its recorder as the process-wide
    /// `metrics` recorder.
    pub fn new(config: ServiceConfig) -> Result<Self, ContainerError> {
        let families = Families::new(&config);
        let registry = MetricsRegistry::install(&families.all())?;
        Self::with_registry(config, families, registry)
    }

    /// Build the container with a private recorder.
    pub fn isolated(config: ServiceConfig) -> Result<Self, ContainerError> {
        let families = Families::new(&config);
        let registry = MetricsRegistry::isolated(&families.all())?;
        Self::with_registry(config, families, registry)
    }

    fn with_registry(
        config: ServiceConfig,
        families: Families,
        registry: MetricsRegistry,
    ) -> Result<Self, ContainerError> {
        let http = RequestInstrumentor::new(TransportKind::Http, registry.clone(), &families.http)?;
        let grpc_unary = RequestInstrumentor::new(
            TransportKind::RpcUnary,
            registry.clone(),
            &families.grpc_unary,
        )?;
        let grpc_stream = RequestInstrumentor::new(
            TransportKind::RpcStream,
            registry.clone(),
            &families.grpc_stream,
        )?;

        tracing::debug!(
            http = ?http,
            grpc_unary = ?grpc_unary,
            grpc_stream = ?grpc_stream,
            "Request instrumentation ready"
        );

        Ok(Self {
            severity: SeverityPolicy::from_config(&config.logging),
            streaming: StreamingMethods::new(config.grpc.streaming_methods.iter().cloned()),
            config: Arc::new(config),
            metrics: registry,
            probes: Probes::new(),
            http,
            grpc_unary,
            grpc_stream,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn probes(&self) -> &Probes {
        &self.probes
    }

    pub fn severity(&self) -> SeverityPolicy {
        self.severity
    }

    pub fn http_instrumentor(&self) -> &RequestInstrumentor {
        &self.http
    }

    pub fn http_metrics_layer(&self) -> HttpMetricsLayer {
        HttpMetricsLayer::new(self.http.clone())
    }

    pub fn http_logging_layer(&self) -> HttpLoggingLayer {
        HttpLoggingLayer::new(self.severity)
    }

    pub fn grpc_metrics_layer(&self) -> GrpcMetricsLayer {
        GrpcMetricsLayer::new(
            self.grpc_unary.clone(),
            self.grpc_stream.clone(),
            self.streaming.clone(),
        )
    }

    pub fn grpc_logging_layer(&self) -> GrpcLoggingLayer {
        GrpcLoggingLayer::new(self.severity, self.streaming.clone())
    }
}
