//! # Hermes Test
//!
//! Test utilities for the Hermes CQS mediator.
//!
//! Dispatch behavior is mostly invisible from the outside: middleware
//! ordering, service lifetimes, and ambient-id propagation happen behind the
//! typed client API. This crate provides the pieces tests use to make that
//! behavior observable and deterministic.
//!
//! ## Key Features
//!
//! - **[`Observations`]**: a shared recorder for events, observed ids, and
//!   service instance numbers
//! - **[`FixedTraceSource`]**: a trace-id source with a predetermined answer
//! - **[`TestFailure`]**: an injectable error for identity-propagation
//!   assertions
//!
//! ## Example
//!
//! ```
//! use hermes_test::Observations;
//!
//! let observations = Observations::new();
//! let middleware_side = observations.clone();
//! let handler_side = observations.clone();
//!
//! middleware_side.note("audit:before");
//! handler_side.note("handler");
//! middleware_side.note("audit:after");
//!
//! assert_eq!(observations.events(), ["audit:before", "handler", "audit:after"]);
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod observations;
mod trace_source;

pub use error::TestFailure;
pub use observations::{Observations, RecordedIds};
pub use trace_source::FixedTraceSource;
