//! Invocation logging middleware.
//!
//! Emits structured [`tracing`] events around each chain execution it wraps:
//! one when the request enters, one when it completes or fails. Every event
//! carries the request type, the dispatch kind, the trace id, and the
//! operation id of the execution it belongs to, so log lines from nested
//! dispatches correlate by trace id while staying distinguishable by
//! operation id.
//!
//! The request payload itself is never logged. Requests travel through the
//! chain in erased form, and payloads routinely carry data that has no place
//! in log output.
//!
//! ## Event levels
//!
//! - entry and success at `INFO`
//! - failure at `ERROR`, with the error's display form attached

use hermes_core::{
    BoxFuture, BoxedRequest, Middleware, MiddlewareContext, MiddlewareResult, Next,
};
use tokio_util::sync::CancellationToken;

/// Per-entry configuration for [`LoggingMiddleware`].
///
/// Each toggle suppresses one of the three events. Defaults emit all of them.
#[derive(Debug, Clone, Copy)]
pub struct LoggingOptions {
    /// Emit an event when a request enters the wrapped chain segment.
    pub on_entry: bool,
    /// Emit an event when the wrapped segment completes successfully.
    pub on_success: bool,
    /// Emit an event when the wrapped segment fails.
    pub on_failure: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self { on_entry: true, on_success: true, on_failure: true }
    }
}

impl LoggingOptions {
    /// Options that only report failures.
    #[must_use]
    pub const fn failures_only() -> Self {
        Self { on_entry: false, on_success: false, on_failure: true }
    }
}

/// Middleware that logs the lifecycle of each execution passing through it.
///
/// # Behavior
///
/// 1. Emit the entry event (unless suppressed)
/// 2. Run the rest of the chain unchanged
/// 3. Emit the success or failure event with the elapsed time
/// 4. Return the inner result untouched
///
/// The middleware holds no state, so it is normally registered with
/// singleton lifetime.
///
/// # Example
///
/// ```
/// use hermes_core::PipelineBuilder;
/// use hermes_middleware::{LoggingMiddleware, LoggingOptions};
///
/// let mut pipeline = PipelineBuilder::new();
/// pipeline.use_with::<LoggingMiddleware>(LoggingOptions::failures_only());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for LoggingMiddleware {
    type Config = LoggingOptions;

    fn execute<'a>(
        &'a self,
        ctx: &'a MiddlewareContext,
        config: &'a Self::Config,
        request: BoxedRequest,
        token: CancellationToken,
        mut next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            if config.on_entry {
                tracing::info!(
                    request = ctx.request_type(),
                    kind = %ctx.kind(),
                    trace_id = %ctx.trace_id(),
                    operation_id = ctx.operation_id().as_ref().map(tracing::field::display),
                    "executing request"
                );
            }

            let result = next.run(ctx, request, token).await;

            match &result {
                Ok(_) if config.on_success => {
                    tracing::info!(
                        request = ctx.request_type(),
                        kind = %ctx.kind(),
                        trace_id = %ctx.trace_id(),
                        operation_id = ctx.operation_id().as_ref().map(tracing::field::display),
                        elapsed = ?ctx.elapsed(),
                        "request completed"
                    );
                }
                Err(error) if config.on_failure => {
                    tracing::error!(
                        request = ctx.request_type(),
                        kind = %ctx.kind(),
                        trace_id = %ctx.trace_id(),
                        operation_id = ctx.operation_id().as_ref().map(tracing::field::display),
                        elapsed = ?ctx.elapsed(),
                        error = %error,
                        "request failed"
                    );
                }
                _ => {}
            }

            result
        })
    }
}
