//! Structured logging for dispatch events.
//!
//! The engine and the built-in middlewares emit `tracing` events with a
//! stable set of fields (see [`fields`]). This module installs a
//! `tracing-subscriber` stack that renders those events as JSON for log
//! storage or in compact form for a terminal.
//!
//! # Example
//!
//! ```rust,ignore
//! use hermes_telemetry::{init_logging, LoggingConfig};
//!
//! init_logging(&LoggingConfig::default())?;
//!
//! tracing::info!(request = "CreateOrder", kind = "command", "dispatching");
//! ```

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Filter directives (e.g. "info", "hermes_dispatch=debug,warn").
    pub level: String,

    /// Whether to output JSON format.
    pub json_format: bool,

    /// Whether to include span events (new, close).
    pub span_events: bool,

    /// Whether to include thread IDs.
    pub thread_ids: bool,

    /// Whether to include the target (module path).
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            span_events: false,
            thread_ids: false,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Creates a development configuration with compact terminal output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            json_format: false,
            span_events: true,
            thread_ids: false,
            include_target: true,
        }
    }

    /// Creates a production configuration with JSON output.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            span_events: false,
            thread_ids: false,
            include_target: true,
        }
    }
}

/// Initializes the logging subsystem.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] when the level directives do
/// not parse, and [`TelemetryError::LoggingInit`] when a global subscriber
/// is already installed.
pub fn init_logging(config: &LoggingConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = env_filter(&config.level)?;

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_span_events(span_events)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    Ok(())
}

/// Creates an env filter from a directive string.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] if the directives are invalid.
pub fn env_filter(directives: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directives).map_err(|e| TelemetryError::InvalidFilter(e.to_string()))
}

/// Field names the engine and built-in middlewares emit.
///
/// Use these when querying structured log storage.
pub mod fields {
    /// Short type name of the dispatched request.
    pub const REQUEST: &str = "request";

    /// Request kind, `command` or `query`.
    pub const KIND: &str = "kind";

    /// Trace id shared by every dispatch in one call tree.
    pub const TRACE_ID: &str = "trace_id";

    /// Operation id of a single dispatch.
    pub const OPERATION_ID: &str = "operation_id";

    /// Time spent in the dispatch.
    pub const ELAPSED: &str = "elapsed";

    /// Error display of a failed dispatch.
    pub const ERROR: &str = "error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert!(config.enabled);
        assert!(config.json_format);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_development_config() {
        let config = LoggingConfig::development();
        assert!(!config.json_format);
        assert!(config.span_events);
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn test_production_config() {
        let config = LoggingConfig::production();
        assert!(config.json_format);
        assert!(!config.span_events);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_env_filter_accepts_directives() {
        assert!(env_filter("info").is_ok());
        assert!(env_filter("hermes_dispatch=debug,hermes_core=warn").is_ok());
    }

    #[test]
    fn test_env_filter_rejects_garbage() {
        let err = env_filter("hermes_dispatch=notalevel").unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidFilter(_)));
    }

    #[test]
    fn test_disabled_logging_is_a_no_op() {
        let config = LoggingConfig { enabled: false, ..Default::default() };
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn test_field_names() {
        assert_eq!(fields::TRACE_ID, "trace_id");
        assert_eq!(fields::OPERATION_ID, "operation_id");
        assert_eq!(fields::REQUEST, "request");
    }
}
