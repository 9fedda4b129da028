//! Access-log severity selection.

use tracing::Level;

use crate::config::LoggingConfig;
use crate::observability::logging::parse_level;

/// Maps call outcomes to log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityPolicy {
    /// Level for 3xx responses.
    pub redirect: Level,
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        Self {
            redirect: Level::INFO,
        }
    }
}

impl SeverityPolicy {
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            redirect: parse_level(&config.redirect_level, Level::INFO),
        }
    }

    /// `>= 500` error, `4xx` warn, `3xx` the redirect level, anything else debug.
    pub fn for_status(&self, status: u16) -> Level {
        match status {
            500.. => Level::ERROR,
            400..=499 => Level::WARN,
            300..=399 => self.redirect,
            _ => Level::DEBUG,
        }
    }

    pub fn for_rpc(&self, ok: bool) -> Level {
        if ok {
            Level::DEBUG
        } else {
            Level::ERROR
        }
    }
}

/// Emit a tracing event whose level is only known at runtime.
macro_rules! dyn_event {
    ($level:expr, target: $target:expr, $($arg:tt)+) => {
        match $level {
            ::tracing::Level::ERROR => ::tracing::event!(target: $target, ::tracing::Level::ERROR, $($arg)+),
            ::tracing::Level::WARN => ::tracing::event!(target: $target, ::tracing::Level::WARN, $($arg)+),
            ::tracing::Level::INFO => ::tracing::event!(target: $target, ::tracing::Level::INFO, $($arg)+),
            ::tracing::Level::DEBUG => ::tracing::event!(target: $target, ::tracing::Level::DEBUG, $($arg)+),
            _ => ::tracing::event!(target: $target, ::tracing::Level::TRACE, $($arg)+),
        }
    };
}

pub(crate) use dyn_event;
