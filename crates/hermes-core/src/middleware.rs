//! Middleware contract and the `next` continuation.
//!
//! A middleware wraps one pipeline position. It receives the erased request,
//! the cancellation token, its own configuration for this pipeline entry, and
//! a [`Next`] continuation for the rest of the chain. Calling `next` zero
//! times short-circuits, once passes through, and more than once re-runs the
//! entire inner chain (middlewares and handler) from scratch, which is how a
//! retry middleware is written.
//!
//! Instances are not owned by the pipeline. Every time an execution reaches an
//! entry, the middleware is resolved from the dispatch scope under its
//! registered lifetime, so a transient middleware sees a fresh instance per
//! chain execution while a singleton accumulates state across dispatches.

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::context::AmbientContext;
use crate::di::ServiceScope;
use crate::error::DispatchError;
use crate::ids::{OperationId, TraceId};
use crate::pipeline::PipelineEntry;
use crate::request::{BoxedRequest, BoxedResponse, RequestKind};

/// An owned, dynamically typed future, as used throughout the pipeline.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of one middleware or chain execution.
pub type MiddlewareResult = Result<BoxedResponse, DispatchError>;

/// The chain terminal: the handler body or a client transport call.
pub type TerminalFn = dyn for<'a> Fn(&'a MiddlewareContext, BoxedRequest, CancellationToken) -> BoxFuture<'a, MiddlewareResult>
    + Send
    + Sync;

/// A cross-cutting wrapper around handler execution.
///
/// Implementations are registered once with the engine and referenced by type
/// from any number of pipelines, each pipeline entry carrying its own
/// [`Middleware::Config`] value.
///
/// # Example
///
/// ```
/// use hermes_core::{BoxFuture, BoxedRequest, Middleware, MiddlewareContext, MiddlewareResult, Next};
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Debug, Clone, Default)]
/// struct AttemptConfig {
///     attempts: u32,
/// }
///
/// struct Retry;
///
/// impl Middleware for Retry {
///     type Config = AttemptConfig;
///
///     fn execute<'a>(
///         &'a self,
///         ctx: &'a MiddlewareContext,
///         config: &'a Self::Config,
///         request: BoxedRequest,
///         token: CancellationToken,
///         mut next: Next<'a>,
///     ) -> BoxFuture<'a, MiddlewareResult> {
///         Box::pin(async move {
///             let mut last = next.run(ctx, request.clone(), token.clone()).await;
///             for _ in 1..config.attempts {
///                 if last.is_ok() {
///                     break;
///                 }
///                 last = next.run(ctx, request.clone(), token.clone()).await;
///             }
///             last
///         })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync + 'static {
    /// Per-pipeline-entry configuration value.
    type Config: Send + Sync + 'static;

    /// Runs this middleware's wrapping logic.
    ///
    /// The `token` is the cancellation signal handed down by the caller side
    /// of the chain; passing a different token to `next` is the supported way
    /// to impose a sub-deadline on everything beneath this entry.
    fn execute<'a>(
        &'a self,
        ctx: &'a MiddlewareContext,
        config: &'a Self::Config,
        request: BoxedRequest,
        token: CancellationToken,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult>;
}

/// Per-dispatch state visible to every middleware in the chain.
///
/// All fields are shared handles; cloning or holding the context does not
/// snapshot anything. In particular [`MiddlewareContext::operation_id`] reads
/// the live ambient stack, so inside a re-run segment it reports the nested
/// operation id of that re-run.
#[derive(Clone)]
pub struct MiddlewareContext {
    ambient: AmbientContext,
    kind: RequestKind,
    request_type: &'static str,
    scope: ServiceScope,
    started_at: Instant,
}

impl MiddlewareContext {
    /// Assembles the context for one dispatch.
    #[must_use]
    pub fn new(
        ambient: AmbientContext,
        kind: RequestKind,
        request_type: &'static str,
        scope: ServiceScope,
    ) -> Self {
        Self { ambient, kind, request_type, scope, started_at: Instant::now() }
    }

    /// The ambient context of this dispatch tree.
    #[must_use]
    pub const fn ambient(&self) -> &AmbientContext {
        &self.ambient
    }

    /// Whether this dispatch carries a command or a query.
    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Short type name of the request being dispatched.
    #[must_use]
    pub const fn request_type(&self) -> &'static str {
        self.request_type
    }

    /// The dependency-resolution scope of this dispatch.
    #[must_use]
    pub const fn scope(&self) -> &ServiceScope {
        &self.scope
    }

    /// The trace id shared by the whole dispatch tree.
    #[must_use]
    pub fn trace_id(&self) -> TraceId {
        self.ambient.trace_id()
    }

    /// The operation id of the innermost in-flight execution of this
    /// dispatch's kind.
    #[must_use]
    pub fn operation_id(&self) -> Option<OperationId> {
        self.ambient.operation_id(self.kind)
    }

    /// Time elapsed since the dispatch entered the engine.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

impl std::fmt::Debug for MiddlewareContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareContext")
            .field("kind", &self.kind)
            .field("request_type", &self.request_type)
            .field("trace_id", &self.trace_id())
            .finish_non_exhaustive()
    }
}

/// Continuation over the remainder of a middleware chain.
///
/// `run` may be called any number of times. The first call executes the inner
/// segment under the dispatch's own operation id; every further call is an
/// independent re-execution and runs under a freshly pushed nested operation
/// id, restored when that call returns. The trace id never changes.
pub struct Next<'a> {
    entries: &'a [PipelineEntry],
    terminal: &'a TerminalFn,
    invocations: u32,
}

impl<'a> Next<'a> {
    /// Builds a continuation over `entries`, ending in `terminal`.
    #[must_use]
    pub fn new(entries: &'a [PipelineEntry], terminal: &'a TerminalFn) -> Self {
        Self { entries, terminal, invocations: 0 }
    }

    /// Runs the remaining chain and the terminal.
    pub async fn run(
        &mut self,
        ctx: &MiddlewareContext,
        request: BoxedRequest,
        token: CancellationToken,
    ) -> MiddlewareResult {
        self.invocations += 1;
        if self.invocations == 1 {
            return run_segment(self.entries, self.terminal, ctx, request, token).await;
        }

        let reinvocation = ctx.ambient().push_operation(ctx.kind());
        tracing::trace!(
            operation_id = %reinvocation.id(),
            invocation = self.invocations,
            "re-running inner pipeline segment"
        );
        let result = run_segment(self.entries, self.terminal, ctx, request, token).await;
        drop(reinvocation);
        result
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.entries.len())
            .field("invocations", &self.invocations)
            .finish_non_exhaustive()
    }
}

fn run_segment<'a>(
    entries: &'a [PipelineEntry],
    terminal: &'a TerminalFn,
    ctx: &'a MiddlewareContext,
    request: BoxedRequest,
    token: CancellationToken,
) -> BoxFuture<'a, MiddlewareResult> {
    match entries.split_first() {
        None => terminal(ctx, request, token),
        Some((head, rest)) => head.invoke(ctx, request, token, Next::new(rest, terminal)),
    }
}
