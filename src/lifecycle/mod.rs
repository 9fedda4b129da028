//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → readiness off → every server's graceful-shutdown future
//!     resolves → in-flight requests drain → exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; each server subscribes before it starts
//! - Readiness drops before listeners stop, so orchestrators stop routing

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
