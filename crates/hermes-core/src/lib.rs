//! Core contracts and pipeline machinery for the Hermes CQS mediator.
//!
//! This crate defines the vocabulary the engine builds on:
//!
//! - [`Command`] and [`Query`] request contracts, routed by type identity to
//!   exactly one [`CommandHandler`] / [`QueryHandler`]
//! - [`AmbientContext`]: the path-scoped carrier of trace id, operation ids,
//!   and the item bag, propagated implicitly across nested dispatches
//! - [`Middleware`], [`Next`], and [`PipelineBuilder`]: the per-handler
//!   middleware pipeline with per-entry configuration
//! - [`ServiceCollection`] / [`ServiceScope`]: lifetime-aware dependency
//!   resolution (transient, scoped, singleton)
//! - [`DispatchError`]: the dispatch error channel that propagates handler
//!   and middleware failures with their concrete type intact
//!
//! The dispatch engine itself lives in `hermes-dispatch`; built-in
//! middlewares in `hermes-middleware`.

#![doc(html_root_url = "https://docs.rs/hermes-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod di;
pub mod error;
pub mod handler;
pub mod ids;
pub mod middleware;
pub mod pipeline;
pub mod request;

pub use context::{
    ActivationGuard, ActivationState, AmbientContext, ItemBag, OperationGuard, TraceIdSource,
};
pub use di::{Lifetime, ResolveError, ServiceCollection, ServiceProvider, ServiceScope};
pub use error::{ContextError, DispatchError, DispatchResult, PipelineError};
pub use handler::{CommandHandler, FnCommandHandler, FnQueryHandler, QueryHandler};
pub use ids::{OperationId, TraceId};
pub use middleware::{
    BoxFuture, Middleware, MiddlewareContext, MiddlewareResult, Next, TerminalFn,
};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineEntry};
pub use request::{
    short_type_name, AnyMessage, BoxedRequest, BoxedResponse, Command, Query, RequestKind,
};

pub use tokio_util::sync::CancellationToken;
