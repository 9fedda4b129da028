//! Liveness and readiness probes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

/// Shared readiness state.
#[derive(Clone, Debug, Default)]
pub struct Probes {
    ready: Arc<AtomicBool>,
}

impl Probes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        let previous = self.ready.swap(ready, Ordering::SeqCst);
        if previous != ready {
            tracing::info!(ready, "Readiness changed");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Serialize)]
pub struct ProbeStatus {
    pub status: &'static str,
}

pub async fn liveness() -> (StatusCode, Json<ProbeStatus>) {
    (StatusCode::OK, Json(ProbeStatus { status: "ok" }))
}

pub async fn readiness(State(probes): State<Probes>) -> (StatusCode, Json<ProbeStatus>) {
    if probes.is_ready() {
        (StatusCode::OK, Json(ProbeStatus { status: "ready" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ProbeStatus { status: "not ready" }),
        )
    }
}

/// `/healthz` and `/healthz/ready` bound to `probes`.
pub fn router(probes: Probes) -> Router {
    Router::new()
        .route("/healthz", get(liveness))
        .route("/healthz/ready", get(readiness))
        .with_state(probes)
}
