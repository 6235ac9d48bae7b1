//! Time-limit middleware.
//!
//! Bounds how long the rest of the chain may run. The middleware hands the
//! inner segment a child of the cancellation token it received, races the
//! segment against a timer, and on expiry cancels the child and fails the
//! dispatch with [`TimeoutElapsed`].
//!
//! Substituting a child token is what keeps the limit local: callers above
//! this entry keep their own token untouched, and cancelling the child can
//! never cancel work outside the wrapped segment.

use std::time::Duration;

use hermes_core::{
    BoxFuture, BoxedRequest, DispatchError, Middleware, MiddlewareContext, MiddlewareResult, Next,
};
use tokio_util::sync::CancellationToken;

/// Per-entry configuration for [`TimeoutMiddleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutOptions {
    /// Maximum wall-clock time the wrapped chain segment may take.
    pub limit: Duration,
}

impl TimeoutOptions {
    /// Options with the given time limit.
    #[must_use]
    pub const fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

impl Default for TimeoutOptions {
    fn default() -> Self {
        Self { limit: Duration::from_secs(30) }
    }
}

/// The error a timed-out dispatch fails with.
///
/// Reaches the caller through the dispatch error channel with its type
/// intact, so callers distinguish a timeout from handler failures by
/// downcasting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{request}` did not complete within {limit:?}")]
pub struct TimeoutElapsed {
    /// Short type name of the request that timed out.
    pub request: &'static str,
    /// The limit that was exceeded.
    pub limit: Duration,
}

/// Middleware that imposes a time limit on the rest of the chain.
///
/// # Behavior
///
/// 1. Derive a child token from the incoming cancellation token
/// 2. Run the inner segment with the child token
/// 3. If the limit expires first, cancel the child and fail with
///    [`TimeoutElapsed`]
///
/// Cancelling the incoming token still reaches the inner segment, since a
/// child token follows its parent.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use hermes_core::PipelineBuilder;
/// use hermes_middleware::{TimeoutMiddleware, TimeoutOptions};
///
/// let mut pipeline = PipelineBuilder::new();
/// pipeline.use_with::<TimeoutMiddleware>(TimeoutOptions::new(Duration::from_secs(2)));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutMiddleware;

impl TimeoutMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for TimeoutMiddleware {
    type Config = TimeoutOptions;

    fn execute<'a>(
        &'a self,
        ctx: &'a MiddlewareContext,
        config: &'a Self::Config,
        request: BoxedRequest,
        token: CancellationToken,
        mut next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let child = token.child_token();
            tokio::select! {
                biased;
                result = next.run(ctx, request, child.clone()) => result,
                () = tokio::time::sleep(config.limit) => {
                    child.cancel();
                    tracing::warn!(
                        request = ctx.request_type(),
                        limit = ?config.limit,
                        "request exceeded its time limit"
                    );
                    Err(DispatchError::from(TimeoutElapsed {
                        request: ctx.request_type(),
                        limit: config.limit,
                    }))
                }
            }
        })
    }
}
