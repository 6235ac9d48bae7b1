//! Observability wiring for the Hermes mediator.
//!
//! Two concerns live here, both optional at runtime:
//!
//! - **Logging**: [`init_logging`] installs a `tracing-subscriber` stack
//!   (JSON or compact, `EnvFilter`-driven) so the engine's dispatch events
//!   carry their trace and operation ids into log storage.
//! - **Trace correlation**: [`OtelTraceIdSource`] feeds the engine's
//!   trace-id seam from the active OpenTelemetry span, so dispatches issued
//!   inside an instrumented request join its distributed trace.
//!
//! # Example
//!
//! ```rust,ignore
//! use hermes_telemetry::{init_logging, LoggingConfig, OtelTraceIdSource};
//!
//! init_logging(&LoggingConfig::default())?;
//!
//! let mediator = hermes_dispatch::MediatorBuilder::new()
//!     .with_trace_source(OtelTraceIdSource::new())
//!     .build()?;
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod trace_source;

pub use error::TelemetryError;
pub use logging::{env_filter, init_logging, LoggingConfig};
pub use trace_source::OtelTraceIdSource;

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
