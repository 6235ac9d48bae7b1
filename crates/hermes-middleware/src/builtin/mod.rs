//! The middlewares shipped with the engine.
//!
//! Both are ordinary [`Middleware`](hermes_core::Middleware) implementations
//! with no special standing: applications register them like their own and
//! place them anywhere in a pipeline.
//!
//! - [`logging`] wraps executions in structured entry/outcome events
//! - [`timeout`] bounds execution time through child-token cancellation

pub mod logging;
pub mod timeout;

pub use logging::{LoggingMiddleware, LoggingOptions};
pub use timeout::{TimeoutElapsed, TimeoutMiddleware, TimeoutOptions};
