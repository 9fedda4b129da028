//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber from `LoggingConfig`
//! - Resolve configured level names into `tracing::Level`
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level when present
//! - JSON format for production, pretty format for development
//! - Access logs use their own target so they can be filtered separately

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Target of per-request access log events.
pub const ACCESS_LOG_TARGET: &str = "server_kit::access";

/// Install the global tracing subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config)));

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
}

fn default_directives(config: &LoggingConfig) -> String {
    format!("{},tower_http=warn,h2=warn,hyper=warn", config.level)
}

/// Parse a level name, falling back to `fallback` for unknown names.
pub fn parse_level(name: &str, fallback: Level) -> Level {
    Level::from_str(name).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("error", Level::INFO), Level::ERROR);
        assert_eq!(parse_level("WARN", Level::INFO), Level::WARN);
        assert_eq!(parse_level("shouting", Level::INFO), Level::INFO);
    }

    #[test]
    fn test_default_directives_quiet_framework_noise() {
        let config = LoggingConfig {
            level: "debug".into(),
            ..LoggingConfig::default()
        };
        assert_eq!(
            default_directives(&config),
            "debug,tower_http=warn,h2=warn,hyper=warn"
        );
    }
}
