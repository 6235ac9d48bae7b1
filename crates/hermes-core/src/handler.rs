//! Handler traits for commands and queries.
//!
//! A handler is the single registered implementation for one request type.
//! Handlers do not receive the ambient context as a parameter; code that
//! needs the trace or operation id reaches it through
//! [`AmbientContext::current`](crate::AmbientContext::current).
//!
//! The `configure_pipeline` hook is the handler type's own middleware
//! declaration. It runs once, when the engine is built, and never at dispatch
//! time. A client registration that supplies its own pipeline configuration
//! replaces the hook outright; the hook is then not invoked at all.

use std::future::Future;
use std::marker::PhantomData;

use tokio_util::sync::CancellationToken;

use crate::error::DispatchResult;
use crate::pipeline::PipelineBuilder;
use crate::request::{Command, Query};

/// Executes one command type.
///
/// # Example
///
/// ```
/// use hermes_core::{Command, CommandHandler, DispatchResult};
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Debug, Clone)]
/// struct Increment {
///     amount: u64,
/// }
///
/// impl Command for Increment {
///     type Response = u64;
/// }
///
/// struct IncrementHandler;
///
/// impl CommandHandler<Increment> for IncrementHandler {
///     async fn handle(&self, command: Increment, _token: CancellationToken) -> DispatchResult<u64> {
///         Ok(command.amount + 1)
///     }
/// }
/// ```
pub trait CommandHandler<C: Command>: Send + Sync + 'static {
    /// Executes the command.
    ///
    /// `token` is whichever cancellation signal the innermost middleware
    /// passed on, which is not necessarily the one the dispatch started with.
    fn handle(
        &self,
        command: C,
        token: CancellationToken,
    ) -> impl Future<Output = DispatchResult<C::Response>> + Send;

    /// Declares this handler's middleware pipeline.
    ///
    /// The default declares none, which is legal: the handler then runs with
    /// no middlewares at all.
    fn configure_pipeline(pipeline: &mut PipelineBuilder) {
        let _ = pipeline;
    }
}

/// Executes one query type.
pub trait QueryHandler<Q: Query>: Send + Sync + 'static {
    /// Executes the query.
    fn handle(
        &self,
        query: Q,
        token: CancellationToken,
    ) -> impl Future<Output = DispatchResult<Q::Response>> + Send;

    /// Declares this handler's middleware pipeline. Defaults to none.
    fn configure_pipeline(pipeline: &mut PipelineBuilder) {
        let _ = pipeline;
    }
}

/// Adapts an async closure into a [`CommandHandler`].
///
/// Used by the engine's delegate registration; closures declare no pipeline.
pub struct FnCommandHandler<C, F, Fut>
where
    C: Command,
    F: Fn(C, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<C::Response>> + Send + 'static,
{
    func: F,
    _phantom: PhantomData<fn(C) -> Fut>,
}

impl<C, F, Fut> FnCommandHandler<C, F, Fut>
where
    C: Command,
    F: Fn(C, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<C::Response>> + Send + 'static,
{
    /// Wraps the closure.
    #[must_use]
    pub const fn new(func: F) -> Self {
        Self { func, _phantom: PhantomData }
    }
}

impl<C, F, Fut> CommandHandler<C> for FnCommandHandler<C, F, Fut>
where
    C: Command,
    F: Fn(C, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<C::Response>> + Send + 'static,
{
    async fn handle(&self, command: C, token: CancellationToken) -> DispatchResult<C::Response> {
        (self.func)(command, token).await
    }
}

/// Adapts an async closure into a [`QueryHandler`].
pub struct FnQueryHandler<Q, F, Fut>
where
    Q: Query,
    F: Fn(Q, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<Q::Response>> + Send + 'static,
{
    func: F,
    _phantom: PhantomData<fn(Q) -> Fut>,
}

impl<Q, F, Fut> FnQueryHandler<Q, F, Fut>
where
    Q: Query,
    F: Fn(Q, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<Q::Response>> + Send + 'static,
{
    /// Wraps the closure.
    #[must_use]
    pub const fn new(func: F) -> Self {
        Self { func, _phantom: PhantomData }
    }
}

impl<Q, F, Fut> QueryHandler<Q> for FnQueryHandler<Q, F, Fut>
where
    Q: Query,
    F: Fn(Q, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<Q::Response>> + Send + 'static,
{
    async fn handle(&self, query: Q, token: CancellationToken) -> DispatchResult<Q::Response> {
        (self.func)(query, token).await
    }
}
