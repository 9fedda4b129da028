//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Latency histogram boundaries in seconds, from 0.5ms up to 30s.
pub const DEFAULT_DURATION_BUCKETS: [f64; 17] = [
    0.0005,
    0.001, // 1ms
    0.002,
    0.005,
    0.01, // 10ms
    0.02,
    0.05,
    0.1, // 100ms
    0.2,
    0.5,
    1.0, // 1s
    2.0,
    5.0,
    10.0, // 10s
    15.0,
    20.0,
    30.0,
];

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings.
    pub http: HttpConfig,

    /// gRPC server settings.
    pub grpc: GrpcConfig,

    /// Metric collection settings shared by both transports.
    pub metrics: MetricsConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Metric namespace for HTTP metrics.
    pub namespace: String,

    /// Metric subsystem for HTTP metrics.
    pub subsystem: String,

    /// Generate an `x-request-id` for requests that arrive without one.
    pub generate_request_id: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            namespace: "http".to_string(),
            subsystem: "server".to_string(),
            generate_request_id: false,
        }
    }
}

/// gRPC server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GrpcConfig {
    /// Serve gRPC from the binary.
    pub enabled: bool,

    /// Bind address (e.g., "0.0.0.0:9090").
    pub bind_address: String,

    /// Metric namespace for gRPC metrics.
    pub namespace: String,

    /// Fully-qualified methods (e.g., "/pkg.Service/Watch") that are
    /// server, client or bidirectional streams.
    pub streaming_methods: Vec<String>,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:9090".to_string(),
            namespace: "grpc".to_string(),
            streaming_methods: Vec::new(),
        }
    }
}

/// Metric collection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Histogram bucket boundaries (seconds) for every request duration metric.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            duration_buckets: DEFAULT_DURATION_BUCKETS.to_vec(),
        }
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Level used for access-log records of 3xx responses.
    pub redirect_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            redirect_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.http.bind_address, "0.0.0.0:8080");
        assert_eq!(config.metrics.duration_buckets.len(), 17);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.grpc.streaming_methods.is_empty());
    }

    #[test]
    fn test_partial_sections() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [http]
            namespace = "echo"
            subsystem = "http"

            [grpc]
            streaming_methods = ["/chat.Chat/Stream"]

            [logging]
            format = "json"
            redirect_level = "error"
            "#,
        )
        .unwrap();

        assert_eq!(config.http.namespace, "echo");
        assert_eq!(config.http.bind_address, "0.0.0.0:8080");
        assert_eq!(config.grpc.streaming_methods, vec!["/chat.Chat/Stream"]);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.redirect_level, "error");
        assert_eq!(config.logging.level, "info");
    }
}
