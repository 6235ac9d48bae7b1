//! Telemetry error types.

use thiserror::Error;

/// Errors raised while wiring up telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The logging subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    /// A filter directive string did not parse.
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),
}
