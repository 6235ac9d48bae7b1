//! Dispatch engine for the Hermes CQS mediator.
//!
//! This crate turns the contracts from `hermes-core` into a running engine:
//!
//! - [`MediatorBuilder`]: registers services, middlewares, handlers, and
//!   transport-backed clients, then validates the whole configuration in one
//!   [`MediatorBuilder::build`] call
//! - [`Mediator`] / [`MediatorScope`]: immutable routing tables plus
//!   per-request resolution scopes
//! - [`CommandClient`] / [`QueryClient`]: typed dispatch handles that run the
//!   frozen middleware pipeline down to the handler or transport
//! - [`CommandTransport`] / [`QueryTransport`]: the seam for requests served
//!   outside the local process
//!
//! Every dispatch runs under an ambient context carrying a shared trace id
//! and per-dispatch operation ids; nested dispatches join their caller's
//! context automatically. Configuration mistakes (conflicting routes,
//! pipelines referencing unregistered middlewares, invalid declarations)
//! fail [`MediatorBuilder::build`] synchronously and never a dispatch.

#![doc(html_root_url = "https://docs.rs/hermes-dispatch/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod builder;
pub mod clients;
pub mod error;
mod executor;
pub mod mediator;
pub mod registry;
pub mod transport;

pub use builder::MediatorBuilder;
pub use clients::{CommandClient, QueryClient};
pub use error::ConfigError;
pub use mediator::{Mediator, MediatorScope};
pub use registry::{RegistrationInfo, RegistrationSource};
pub use transport::{CommandTransport, QueryTransport, TransportContext};
