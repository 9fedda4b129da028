//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Orchestrator probes:
//!     GET /healthz        → liveness (200 while the process serves)
//!     GET /healthz/ready  → readiness (200 once marked ready, 503 otherwise)
//!
//! Lifecycle:
//!     startup  → Probes::set_ready(true) after listeners are bound
//!     shutdown → Probes::set_ready(false) before draining
//! ```
//!
//! # Design Decisions
//! - Readiness is a single shared flag, cloned into every handler
//! - Probe responses are small JSON documents

pub mod probes;

pub use probes::{liveness, readiness, router, ProbeStatus, Probes};
