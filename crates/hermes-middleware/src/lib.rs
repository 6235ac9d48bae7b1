//! # Hermes Middleware
//!
//! Built-in middlewares for the Hermes dispatch pipeline.
//!
//! A Hermes pipeline is declared per handler; each entry names a middleware
//! type and carries that entry's own configuration value. This crate supplies
//! the two middlewares most applications reach for first:
//!
//! | Middleware            | Configuration      | Purpose                                      |
//! |-----------------------|--------------------|----------------------------------------------|
//! | [`LoggingMiddleware`] | [`LoggingOptions`] | Structured entry/outcome events per dispatch |
//! | [`TimeoutMiddleware`] | [`TimeoutOptions`] | Time limit via child-token cancellation      |
//!
//! Both must be registered with the engine before a pipeline may reference
//! them, exactly like application-defined middlewares.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use hermes_core::PipelineBuilder;
//! use hermes_middleware::{LoggingMiddleware, TimeoutMiddleware, TimeoutOptions};
//!
//! let mut pipeline = PipelineBuilder::new();
//! pipeline
//!     .use_middleware::<LoggingMiddleware>()
//!     .use_with::<TimeoutMiddleware>(TimeoutOptions::new(Duration::from_secs(2)));
//! assert_eq!(pipeline.middleware_names(), ["LoggingMiddleware", "TimeoutMiddleware"]);
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod builtin;

pub use builtin::logging::{LoggingMiddleware, LoggingOptions};
pub use builtin::timeout::{TimeoutElapsed, TimeoutMiddleware, TimeoutOptions};
