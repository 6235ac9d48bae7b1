//! # Hermes
//!
//! **Command/Query mediator for the Themis Platform**
//!
//! Hermes is an opinionated CQS dispatch library that provides:
//!
//! - 📨 **Typed Dispatch** – Commands and queries routed by type to exactly one handler
//! - 🧩 **Per-Handler Pipelines** – Middleware chains declared and configured per registration
//! - 🔍 **Ambient Trace Context** – Trace and operation ids that follow nested dispatches
//! - 🔌 **Transport Clients** – Remote requests behind the same typed client API
//! - ⚡ **High Performance** – Async Rust with zero-cost abstractions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hermes::prelude::*;
//!
//! #[derive(Debug, Clone)]
//! struct CreateOrder {
//!     lines: u32,
//! }
//!
//! impl Command for CreateOrder {
//!     type Response = u64;
//! }
//!
//! struct CreateOrderHandler;
//!
//! impl CommandHandler<CreateOrder> for CreateOrderHandler {
//!     async fn handle(&self, command: CreateOrder, _token: CancellationToken) -> DispatchResult<u64> {
//!         Ok(u64::from(command.lines))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mediator = MediatorBuilder::new()
//!         .register_command_handler(Lifetime::Scoped, |_| Ok(CreateOrderHandler))
//!         .build()?;
//!
//!     let client = mediator.scope().command_client::<CreateOrder>()?;
//!     let order_id = client.execute(CreateOrder { lines: 3 }, CancellationToken::new()).await?;
//!     println!("created order {order_id}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! Every dispatch runs the same path, with the pipeline declared per handler:
//!
//! ```text
//! Execute → Context Bind → Middleware Chain → Handler / Transport
//!                                                ↓
//! Response ← Typed Downcast ← Chain Unwind ←─────┘
//! ```
//!
//! Nested dispatches issued from inside a handler join their caller's
//! ambient context, so one trace id covers the whole call tree while every
//! dispatch keeps its own operation id.

#![doc(html_root_url = "https://docs.rs/hermes/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core contracts
pub use hermes_core as core;

// Re-export the dispatch engine
pub use hermes_dispatch as dispatch;

// Re-export the built-in middlewares
pub use hermes_middleware as middleware;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use hermes::prelude::*;
/// ```
pub mod prelude {
    pub use hermes_core::{
        AmbientContext, BoxFuture, BoxedRequest, BoxedResponse, CancellationToken, Command,
        CommandHandler, ContextError, DispatchError, DispatchResult, ItemBag, Lifetime,
        Middleware, MiddlewareContext, MiddlewareResult, Next, OperationId, PipelineBuilder,
        Query, QueryHandler, ResolveError, ServiceScope, TraceId, TraceIdSource,
    };

    // Re-export the engine surface
    pub use hermes_dispatch::{
        CommandClient, CommandTransport, ConfigError, Mediator, MediatorBuilder, MediatorScope,
        QueryClient, QueryTransport, TransportContext,
    };

    // Re-export the built-in middlewares
    pub use hermes_middleware::{
        LoggingMiddleware, LoggingOptions, TimeoutElapsed, TimeoutMiddleware, TimeoutOptions,
    };
}
