//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (bucket boundaries, socket addresses, levels)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::str::FromStr;

use tracing::Level;

use crate::config::schema::ServiceConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    BindAddress { field: &'static str, value: String },

    #[error("metrics.duration_buckets must not be empty")]
    EmptyBuckets,

    #[error("metrics.duration_buckets[{index}] = {value} must be finite and positive")]
    InvalidBucket { index: usize, value: f64 },

    #[error("metrics.duration_buckets must be strictly increasing (at index {index})")]
    UnsortedBuckets { index: usize },

    #[error("{field}: unknown log level {value:?}")]
    LogLevel { field: &'static str, value: String },

    #[error("{field} must not be empty")]
    EmptyName { field: &'static str },

    #[error("grpc.streaming_methods: {0:?} is not a fully-qualified method path")]
    StreamingMethod(String),
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address("http.bind_address", &config.http.bind_address, &mut errors);
    check_address("grpc.bind_address", &config.grpc.bind_address, &mut errors);

    if config.http.subsystem.is_empty() && config.http.namespace.is_empty() {
        errors.push(ValidationError::EmptyName { field: "http.namespace" });
    }
    if config.grpc.namespace.is_empty() {
        errors.push(ValidationError::EmptyName { field: "grpc.namespace" });
    }

    for method in &config.grpc.streaming_methods {
        if !method.starts_with('/') || method.len() < 2 {
            errors.push(ValidationError::StreamingMethod(method.clone()));
        }
    }

    check_buckets(&config.metrics.duration_buckets, &mut errors);

    check_level("logging.level", &config.logging.level, &mut errors);
    check_level("logging.redirect_level", &config.logging.redirect_level, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_level(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if Level::from_str(value).is_err() {
        errors.push(ValidationError::LogLevel {
            field,
            value: value.to_string(),
        });
    }
}

fn check_buckets(buckets: &[f64], errors: &mut Vec<ValidationError>) {
    if buckets.is_empty() {
        errors.push(ValidationError::EmptyBuckets);
        return;
    }

    for (index, value) in buckets.iter().copied().enumerate() {
        if !value.is_finite() || value <= 0.0 {
            errors.push(ValidationError::InvalidBucket { index, value });
        }
    }

    if let Some(index) = buckets.windows(2).position(|pair| pair[0] >= pair[1]) {
        errors.push(ValidationError::UnsortedBuckets { index: index + 1 });
    }
}
