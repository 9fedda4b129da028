//! server-kit
//!
//! Runs an instrumented HTTP server and, when enabled, an instrumented gRPC
//! server exposing the standard gRPC health service.
//!
//! # Architecture Overview
//!
//! ```text
//!     HTTP client ──▶ request id ─▶ metrics ─▶ access log ─▶ routes / 404
//!                                      │            │
//!     gRPC client ──▶ metrics ─▶ access log ─▶ tonic-health
//!                        │            │
//!                        ▼            ▼
//!               MetricsRegistry   tracing subscriber
//!                        │
//!     scraper ◀── GET /metrics
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::{routing::get, Router};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tonic_health::ServingStatus;

use server_kit::config::{load_config, ServiceConfig};
use server_kit::lifecycle::{wait_for_signal, Shutdown};
use server_kit::observability::init_logging;
use server_kit::{new_grpc_server, Container, HttpServer};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "server-kit", version, about = "Instrumented HTTP and gRPC server")]
struct Args {
    /// Path to a TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    init_logging(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        http_address = %config.http.bind_address,
        grpc_enabled = config.grpc.enabled,
        grpc_address = %config.grpc.bind_address,
        "server-kit starting"
    );

    let container = Container::new(config)?;
    let shutdown = Shutdown::new();

    let upkeep = tokio::spawn(run_upkeep(container.clone(), shutdown.subscribe()));

    let listener = TcpListener::bind(&container.config().http.bind_address).await?;
    let http = HttpServer::new(&container, app());
    let http_task = tokio::spawn(http.run(listener, shutdown.signalled()));

    let grpc_task = if container.config().grpc.enabled {
        let addr: SocketAddr = container.config().grpc.bind_address.parse()?;
        let (reporter, health_service) = tonic_health::server::health_reporter();
        reporter
            .set_service_status("", ServingStatus::Serving)
            .await;

        tracing::info!(address = %addr, "gRPC server starting");
        let server = new_grpc_server(&container)
            .add_service(health_service)
            .serve_with_shutdown(addr, shutdown.signalled());
        Some(tokio::spawn(async move {
            let result = server.await;
            tracing::info!("gRPC server stopped");
            result
        }))
    } else {
        None
    };

    container.probes().set_ready(true);

    wait_for_signal().await;
    container.probes().set_ready(false);
    shutdown.trigger();

    http_task.await??;
    if let Some(grpc_task) = grpc_task {
        grpc_task.await??;
    }
    upkeep.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Routes the binary serves besides the built-in endpoints.
fn app() -> Router {
    Router::new().route("/", get(|| async { env!("CARGO_PKG_NAME") }))
}

/// Periodically drain histogram buffers until shutdown.
async fn run_upkeep(container: Container, mut stop: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(UPKEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => container.metrics().run_upkeep(),
            _ = stop.recv() => break,
        }
    }
}
