//! Pipeline declaration and freezing.
//!
//! A [`PipelineBuilder`] accumulates ordered middleware entries, each carrying
//! its own configuration value. Handlers declare pipelines in their
//! `configure_pipeline` hook; client registrations may supply a replacement
//! declaration. Freezing produces an immutable [`Pipeline`] whose entries can
//! be executed concurrently by any number of dispatches.
//!
//! Entries reference middlewares by type only. The instance is resolved from
//! the dispatch scope each time an execution reaches the entry, which is what
//! gives transient middlewares a fresh instance per chain execution.
//!
//! Declaration mistakes (configuring a middleware that was never added) are
//! recorded and surfaced when the pipeline is frozen, so a broken declaration
//! fails the engine build rather than a dispatch.

use std::any::{Any, TypeId};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{DispatchError, PipelineError};
use crate::middleware::{BoxFuture, Middleware, MiddlewareContext, MiddlewareResult, Next};
use crate::request::{short_type_name, BoxedRequest};

type EntryInvoker = Arc<
    dyn for<'a> Fn(
            &'a PipelineEntry,
            &'a MiddlewareContext,
            BoxedRequest,
            CancellationToken,
            Next<'a>,
        ) -> BoxFuture<'a, MiddlewareResult>
        + Send
        + Sync,
>;

fn invoke_middleware<'a, M: Middleware>(
    entry: &'a PipelineEntry,
    ctx: &'a MiddlewareContext,
    request: BoxedRequest,
    token: CancellationToken,
    next: Next<'a>,
) -> BoxFuture<'a, MiddlewareResult> {
    Box::pin(async move {
        let middleware = ctx.scope().resolve::<M>().map_err(DispatchError::from)?;
        let config = entry.config_ref::<M::Config>().ok_or_else(|| {
            DispatchError::msg(format!(
                "configuration for middleware `{}` has an unexpected type",
                entry.name()
            ))
        })?;
        tracing::trace!(middleware = entry.name(), "entering middleware");
        middleware.execute(ctx, config, request, token, next).await
    })
}

/// One frozen position in a pipeline: a middleware type plus the
/// configuration value declared for this position.
pub struct PipelineEntry {
    middleware_type: TypeId,
    name: &'static str,
    config: Arc<dyn Any + Send + Sync>,
    invoker: EntryInvoker,
}

impl PipelineEntry {
    /// Type identity of the middleware this entry references.
    #[must_use]
    pub const fn middleware_type(&self) -> TypeId {
        self.middleware_type
    }

    /// Short middleware type name, for logs and error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn invoke<'a>(
        &'a self,
        ctx: &'a MiddlewareContext,
        request: BoxedRequest,
        token: CancellationToken,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        (self.invoker)(self, ctx, request, token, next)
    }

    fn config_ref<C: 'static>(&self) -> Option<&C> {
        self.config.downcast_ref::<C>()
    }
}

impl std::fmt::Debug for PipelineEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

struct BuilderEntry {
    middleware_type: TypeId,
    name: &'static str,
    config: Box<dyn Any + Send + Sync>,
    invoker: EntryInvoker,
}

/// Ordered, mutable declaration of a middleware pipeline.
///
/// # Example
///
/// ```
/// use hermes_core::{BoxFuture, BoxedRequest, Middleware, MiddlewareContext, MiddlewareResult, Next, PipelineBuilder};
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Debug, Clone, Default)]
/// struct Limit {
///     attempts: u32,
/// }
///
/// struct Retry;
///
/// impl Middleware for Retry {
///     type Config = Limit;
/// #     fn execute<'a>(
/// #         &'a self,
/// #         ctx: &'a MiddlewareContext,
/// #         _config: &'a Limit,
/// #         request: BoxedRequest,
/// #         token: CancellationToken,
/// #         mut next: Next<'a>,
/// #     ) -> BoxFuture<'a, MiddlewareResult> {
/// #         Box::pin(async move { next.run(ctx, request, token).await })
/// #     }
/// }
///
/// let mut pipeline = PipelineBuilder::new();
/// pipeline
///     .use_with::<Retry>(Limit { attempts: 2 })
///     .configure::<Retry>(Limit { attempts: 5 });
/// let frozen = pipeline.freeze()?;
/// assert_eq!(frozen.len(), 1);
/// # Ok::<(), hermes_core::PipelineError>(())
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    entries: Vec<BuilderEntry>,
    error: Option<PipelineError>,
}

impl PipelineBuilder {
    /// Creates an empty pipeline declaration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware entry with its default configuration.
    ///
    /// The same middleware type may be appended any number of times; each
    /// entry is independent.
    pub fn use_middleware<M>(&mut self) -> &mut Self
    where
        M: Middleware,
        M::Config: Default,
    {
        self.use_with::<M>(M::Config::default())
    }

    /// Appends a middleware entry with an explicit configuration value.
    pub fn use_with<M: Middleware>(&mut self, config: M::Config) -> &mut Self {
        self.entries.push(BuilderEntry {
            middleware_type: TypeId::of::<M>(),
            name: short_type_name::<M>(),
            config: Box::new(config),
            invoker: Arc::new(invoke_middleware::<M>),
        });
        self
    }

    /// Replaces the configuration of the most recently added entry for `M`.
    ///
    /// Configuring a middleware that was never added records an error which
    /// fails [`PipelineBuilder::freeze`].
    pub fn configure<M: Middleware>(&mut self, config: M::Config) -> &mut Self {
        match self.last_entry_mut::<M>() {
            Some(entry) => entry.config = Box::new(config),
            None => self.record_missing::<M>(),
        }
        self
    }

    /// Mutates the configuration of the most recently added entry for `M`
    /// in place.
    pub fn configure_with<M, F>(&mut self, mutate: F) -> &mut Self
    where
        M: Middleware,
        F: FnOnce(&mut M::Config),
    {
        match self.last_entry_mut::<M>() {
            Some(entry) => {
                if let Some(config) = entry.config.downcast_mut::<M::Config>() {
                    mutate(config);
                }
            }
            None => self.record_missing::<M>(),
        }
        self
    }

    /// Removes every entry for `M`, preserving the order of the rest.
    pub fn without<M: Middleware>(&mut self) -> &mut Self {
        self.entries.retain(|entry| entry.middleware_type != TypeId::of::<M>());
        self
    }

    /// Number of declared entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no entries are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Short names of the declared entries, in order.
    #[must_use]
    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.name).collect()
    }

    /// Finalizes the declaration.
    ///
    /// # Errors
    ///
    /// Returns the first declaration error recorded by `configure` calls
    /// against middlewares that were never added.
    pub fn freeze(self) -> Result<Pipeline, PipelineError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let entries = self
            .entries
            .into_iter()
            .map(|entry| PipelineEntry {
                middleware_type: entry.middleware_type,
                name: entry.name,
                config: Arc::from(entry.config),
                invoker: entry.invoker,
            })
            .collect::<Vec<_>>();
        Ok(Pipeline { entries: Arc::from(entries) })
    }

    fn last_entry_mut<M: Middleware>(&mut self) -> Option<&mut BuilderEntry> {
        self.entries
            .iter_mut()
            .rev()
            .find(|entry| entry.middleware_type == TypeId::of::<M>())
    }

    fn record_missing<M: Middleware>(&mut self) {
        if self.error.is_none() {
            self.error = Some(PipelineError::not_in_pipeline(std::any::type_name::<M>()));
        }
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("middlewares", &self.middleware_names())
            .field("error", &self.error)
            .finish()
    }
}

/// An immutable, executable middleware pipeline.
///
/// Cheap to clone; clones share the frozen entries.
#[derive(Clone)]
pub struct Pipeline {
    entries: Arc<[PipelineEntry]>,
}

impl Pipeline {
    /// A pipeline with no entries; executions run the terminal directly.
    #[must_use]
    pub fn empty() -> Self {
        Self { entries: Arc::from(Vec::new()) }
    }

    /// The frozen entries in declaration order, outermost first.
    #[must_use]
    pub fn entries(&self) -> &[PipelineEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the pipeline has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Type identities of the referenced middlewares, in order.
    pub fn middleware_types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.entries.iter().map(PipelineEntry::middleware_type)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.entries.iter().map(PipelineEntry::name).collect();
        f.debug_struct("Pipeline").field("middlewares", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AmbientContext;
    use crate::di::{Lifetime, ServiceCollection, ServiceScope};
    use crate::middleware::TerminalFn;
    use crate::request::{BoxedResponse, RequestKind};
    use parking_lot::Mutex;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    struct Tag {
        value: &'static str,
    }

    impl Default for Tag {
        fn default() -> Self {
            Self { value: "default" }
        }
    }

    struct Recording {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Recording {
        type Config = Tag;

        fn execute<'a>(
            &'a self,
            ctx: &'a MiddlewareContext,
            config: &'a Tag,
            request: BoxedRequest,
            token: CancellationToken,
            mut next: Next<'a>,
        ) -> BoxFuture<'a, MiddlewareResult> {
            Box::pin(async move {
                self.log.lock().push(format!("before:{}", config.value));
                if config.value == "short-circuit" {
                    return Ok(Box::new(0_u32) as BoxedResponse);
                }
                let result = next.run(ctx, request, token).await;
                self.log.lock().push(format!("after:{}", config.value));
                result
            })
        }
    }

    fn scope_with_recording(log: Arc<Mutex<Vec<String>>>) -> ServiceScope {
        let mut services = ServiceCollection::new();
        services.register::<Recording, _>(Lifetime::Singleton, move |_| {
            Ok(Recording { log: log.clone() })
        });
        services.build().create_scope()
    }

    fn logging_terminal(log: Arc<Mutex<Vec<String>>>) -> Box<TerminalFn> {
        Box::new(move |_ctx, _request, _token| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().push("handler".to_string());
                Ok(Box::new(1_u32) as BoxedResponse)
            })
        })
    }

    async fn run_pipeline(pipeline: &Pipeline, log: Arc<Mutex<Vec<String>>>) {
        let scope = scope_with_recording(log.clone());
        let ctx = MiddlewareContext::new(
            AmbientContext::new(),
            RequestKind::Command,
            "TestCommand",
            scope,
        );
        let terminal = logging_terminal(log);
        let mut next = Next::new(pipeline.entries(), &*terminal);
        next.run(&ctx, Box::new(5_u8) as BoxedRequest, CancellationToken::new())
            .await
            .expect("pipeline should succeed");
    }

    #[tokio::test]
    async fn test_entries_run_outermost_first() {
        let mut builder = PipelineBuilder::new();
        builder
            .use_with::<Recording>(Tag { value: "outer" })
            .use_with::<Recording>(Tag { value: "inner" });
        let pipeline = builder.freeze().unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        run_pipeline(&pipeline, log.clone()).await;

        assert_eq!(
            *log.lock(),
            vec!["before:outer", "before:inner", "handler", "after:inner", "after:outer"]
        );
    }

    #[tokio::test]
    async fn test_configure_replaces_most_recent_entry_only() {
        let mut builder = PipelineBuilder::new();
        builder
            .use_with::<Recording>(Tag { value: "first" })
            .use_with::<Recording>(Tag { value: "second" })
            .configure::<Recording>(Tag { value: "patched" });
        let pipeline = builder.freeze().unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        run_pipeline(&pipeline, log.clone()).await;

        assert_eq!(
            *log.lock(),
            vec!["before:first", "before:patched", "handler", "after:patched", "after:first"]
        );
    }

    #[tokio::test]
    async fn test_configure_with_mutates_in_place() {
        let mut builder = PipelineBuilder::new();
        builder
            .use_middleware::<Recording>()
            .configure_with::<Recording, _>(|tag| tag.value = "mutated");
        let pipeline = builder.freeze().unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        run_pipeline(&pipeline, log.clone()).await;

        assert_eq!(*log.lock(), vec!["before:mutated", "handler", "after:mutated"]);
    }

    #[test]
    fn test_configure_before_use_fails_at_freeze() {
        let mut builder = PipelineBuilder::new();
        builder.configure::<Recording>(Tag { value: "nope" });
        let err = builder.freeze().unwrap_err();
        assert!(err.to_string().contains("Recording"));
    }

    #[test]
    fn test_without_removes_all_matching_entries() {
        let mut builder = PipelineBuilder::new();
        builder
            .use_with::<Recording>(Tag { value: "a" })
            .use_with::<Recording>(Tag { value: "b" })
            .without::<Recording>();
        let pipeline = builder.freeze().unwrap();
        assert!(pipeline.is_empty());
    }

    #[tokio::test]
    async fn test_short_circuit_skips_inner_entries_and_terminal() {
        let mut builder = PipelineBuilder::new();
        builder
            .use_with::<Recording>(Tag { value: "short-circuit" })
            .use_with::<Recording>(Tag { value: "inner" });
        let pipeline = builder.freeze().unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        run_pipeline(&pipeline, log.clone()).await;

        assert_eq!(*log.lock(), vec!["before:short-circuit"]);
    }

    #[tokio::test]
    async fn test_unregistered_middleware_fails_resolution_at_execution() {
        let mut builder = PipelineBuilder::new();
        builder.use_middleware::<Recording>();
        let pipeline = builder.freeze().unwrap();

        // scope without a Recording registration
        let scope = ServiceCollection::new().build().create_scope();
        let ctx = MiddlewareContext::new(
            AmbientContext::new(),
            RequestKind::Command,
            "TestCommand",
            scope,
        );
        let terminal = logging_terminal(Arc::new(Mutex::new(Vec::new())));
        let mut next = Next::new(pipeline.entries(), &*terminal);
        let err = next
            .run(&ctx, Box::new(5_u8) as BoxedRequest, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is::<crate::di::ResolveError>());
    }

    proptest! {
        #[test]
        fn prop_configure_errors_exactly_when_no_prior_use(ops in proptest::collection::vec(any::<bool>(), 1..12)) {
            let mut builder = PipelineBuilder::new();
            let mut uses = 0_usize;
            let mut expect_error = false;
            for is_use in ops {
                if is_use {
                    builder.use_with::<Recording>(Tag { value: "u" });
                    uses += 1;
                } else {
                    builder.configure::<Recording>(Tag { value: "c" });
                    if uses == 0 {
                        expect_error = true;
                    }
                }
            }
            let frozen = builder.freeze();
            prop_assert_eq!(frozen.is_err(), expect_error);
            if let Ok(pipeline) = frozen {
                prop_assert_eq!(pipeline.len(), uses);
            }
        }
    }
}
