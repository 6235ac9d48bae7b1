//! Dispatch execution.
//!
//! One dispatch binds an ambient context, pushes an operation id, and runs
//! the registration's frozen pipeline down to its terminal. The terminal is
//! either the registered handler (resolved from the dispatch scope) or a
//! lazily built transport for client registrations.
//!
//! Context rules: a dispatch issued with no ambient context creates one and
//! binds it for exactly its own duration; a dispatch issued inside an
//! existing scope (a nested dispatch, or one under a manual scope) joins
//! that context, so the trace id carries through while the operation id is
//! fresh per dispatch. The engine never activates a context; the item bag
//! stays under the control of handlers and middlewares.

use std::future::Future;
use std::sync::Arc;

use hermes_core::{
    AmbientContext, BoxFuture, BoxedRequest, BoxedResponse, Command, CommandHandler,
    DispatchError, DispatchResult, MiddlewareContext, MiddlewareResult, Next, Query,
    QueryHandler, ServiceScope, TerminalFn, TraceIdSource,
};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::registry::Registration;
use crate::transport::{CommandTransport, QueryTransport, TransportContext};

pub(crate) async fn run_dispatch(
    registration: &Registration,
    scope: &ServiceScope,
    trace_source: Option<&Arc<dyn TraceIdSource>>,
    request: BoxedRequest,
    token: CancellationToken,
) -> MiddlewareResult {
    match AmbientContext::current() {
        Some(ambient) => run_in_context(registration, scope, ambient, request, token).await,
        None => {
            let ambient = match trace_source {
                Some(source) => AmbientContext::from_source(source.as_ref()),
                None => AmbientContext::new(),
            };
            ambient
                .clone()
                .scope(run_in_context(registration, scope, ambient, request, token))
                .await
        }
    }
}

async fn run_in_context(
    registration: &Registration,
    scope: &ServiceScope,
    ambient: AmbientContext,
    request: BoxedRequest,
    token: CancellationToken,
) -> MiddlewareResult {
    let operation = ambient.push_operation(registration.kind);
    tracing::debug!(
        request = registration.request_name,
        kind = registration.kind.label(),
        trace_id = %ambient.trace_id(),
        operation_id = %operation.id(),
        "dispatching"
    );

    let ctx = MiddlewareContext::new(
        ambient,
        registration.kind,
        registration.request_name,
        scope.clone(),
    );
    let mut next = Next::new(registration.pipeline.entries(), registration.terminal.as_ref());
    let result = next.run(&ctx, request, token).await;

    match &result {
        Ok(_) => tracing::debug!(
            request = registration.request_name,
            operation_id = %operation.id(),
            elapsed = ?ctx.elapsed(),
            "dispatch completed"
        ),
        Err(error) => tracing::debug!(
            request = registration.request_name,
            operation_id = %operation.id(),
            elapsed = ?ctx.elapsed(),
            error = %error,
            "dispatch failed"
        ),
    }

    drop(operation);
    result
}

pub(crate) fn command_terminal<'a, C, H>(
    ctx: &'a MiddlewareContext,
    request: BoxedRequest,
    token: CancellationToken,
) -> BoxFuture<'a, MiddlewareResult>
where
    C: Command,
    H: CommandHandler<C>,
{
    Box::pin(async move {
        let handler = ctx.scope().resolve::<H>().map_err(DispatchError::from)?;
        let command = downcast_request::<C>(request, ctx)?;
        let response = handler.handle(command, token).await?;
        Ok(Box::new(response) as BoxedResponse)
    })
}

pub(crate) fn query_terminal<'a, Q, H>(
    ctx: &'a MiddlewareContext,
    request: BoxedRequest,
    token: CancellationToken,
) -> BoxFuture<'a, MiddlewareResult>
where
    Q: Query,
    H: QueryHandler<Q>,
{
    Box::pin(async move {
        let handler = ctx.scope().resolve::<H>().map_err(DispatchError::from)?;
        let query = downcast_request::<Q>(request, ctx)?;
        let response = handler.handle(query, token).await?;
        Ok(Box::new(response) as BoxedResponse)
    })
}

pub(crate) fn command_transport_terminal<C, T, F, Fut>(build: F) -> Arc<TerminalFn>
where
    C: Command,
    T: CommandTransport<C>,
    F: Fn(TransportContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<T>> + Send + 'static,
{
    let cell: Arc<OnceCell<Arc<T>>> = Arc::new(OnceCell::new());
    let build = Arc::new(build);
    let terminal: Arc<TerminalFn> = Arc::new(move |ctx, request, token| {
        run_command_transport::<C, T, F, Fut>(
            Arc::clone(&cell),
            Arc::clone(&build),
            ctx,
            request,
            token,
        )
    });
    terminal
}

pub(crate) fn query_transport_terminal<Q, T, F, Fut>(build: F) -> Arc<TerminalFn>
where
    Q: Query,
    T: QueryTransport<Q>,
    F: Fn(TransportContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<T>> + Send + 'static,
{
    let cell: Arc<OnceCell<Arc<T>>> = Arc::new(OnceCell::new());
    let build = Arc::new(build);
    let terminal: Arc<TerminalFn> = Arc::new(move |ctx, request, token| {
        run_query_transport::<Q, T, F, Fut>(
            Arc::clone(&cell),
            Arc::clone(&build),
            ctx,
            request,
            token,
        )
    });
    terminal
}

fn run_command_transport<'a, C, T, F, Fut>(
    cell: Arc<OnceCell<Arc<T>>>,
    build: Arc<F>,
    ctx: &'a MiddlewareContext,
    request: BoxedRequest,
    token: CancellationToken,
) -> BoxFuture<'a, MiddlewareResult>
where
    C: Command,
    T: CommandTransport<C>,
    F: Fn(TransportContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<T>> + Send + 'static,
{
    Box::pin(async move {
        let transport = obtain_transport(&cell, build.as_ref(), ctx).await?;
        let command = downcast_request::<C>(request, ctx)?;
        let response = transport.execute(command, token).await?;
        Ok(Box::new(response) as BoxedResponse)
    })
}

fn run_query_transport<'a, Q, T, F, Fut>(
    cell: Arc<OnceCell<Arc<T>>>,
    build: Arc<F>,
    ctx: &'a MiddlewareContext,
    request: BoxedRequest,
    token: CancellationToken,
) -> BoxFuture<'a, MiddlewareResult>
where
    Q: Query,
    T: QueryTransport<Q>,
    F: Fn(TransportContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<T>> + Send + 'static,
{
    Box::pin(async move {
        let transport = obtain_transport(&cell, build.as_ref(), ctx).await?;
        let query = downcast_request::<Q>(request, ctx)?;
        let response = transport.execute(query, token).await?;
        Ok(Box::new(response) as BoxedResponse)
    })
}

// The transport is built inside the first dispatch that needs it and shared
// by every later one. A failed build leaves the cell empty, so the next
// dispatch attempts the build again.
async fn obtain_transport<T, F, Fut>(
    cell: &OnceCell<Arc<T>>,
    build: &F,
    ctx: &MiddlewareContext,
) -> Result<Arc<T>, DispatchError>
where
    T: Send + Sync + 'static,
    F: Fn(TransportContext) -> Fut,
    Fut: Future<Output = DispatchResult<T>>,
{
    let transport = cell
        .get_or_try_init(|| {
            tracing::debug!(request = ctx.request_type(), "building client transport");
            let context =
                TransportContext::new(ctx.ambient().clone(), ctx.scope().clone());
            async move { build(context).await.map(Arc::new) }
        })
        .await?;
    Ok(Arc::clone(transport))
}

fn downcast_request<R: Send + 'static>(
    request: BoxedRequest,
    ctx: &MiddlewareContext,
) -> Result<R, DispatchError> {
    request.into_any().downcast::<R>().map(|request| *request).map_err(|_| {
        DispatchError::msg(format!(
            "request payload for `{}` arrived with an unexpected type",
            ctx.request_type()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::any::TypeId;
    use std::collections::HashSet;

    use hermes_core::{Lifetime, RequestKind, ServiceCollection, TraceId, short_type_name};
    use parking_lot::Mutex;

    use crate::registry::{self, Pending, PipelineDecl, RegistrationSource};

    #[derive(Debug, Clone)]
    struct Add {
        value: u32,
    }

    impl Command for Add {
        type Response = u32;
    }

    struct AddHandler {
        seen: Arc<Mutex<Vec<TraceId>>>,
    }

    impl CommandHandler<Add> for AddHandler {
        async fn handle(&self, command: Add, _token: CancellationToken) -> DispatchResult<u32> {
            let ambient = AmbientContext::current().expect("dispatch should bind a context");
            self.seen.lock().push(ambient.trace_id());
            Ok(command.value + 1)
        }
    }

    fn add_registration() -> Arc<Registration> {
        let terminal: Arc<TerminalFn> = Arc::new(command_terminal::<Add, AddHandler>);
        let pending = Pending {
            request_type: TypeId::of::<Add>(),
            request_name: short_type_name::<Add>(),
            request_type_name: std::any::type_name::<Add>(),
            response_type_name: Some(std::any::type_name::<u32>()),
            handler_type: TypeId::of::<AddHandler>(),
            handler_type_name: std::any::type_name::<AddHandler>(),
            kind: RequestKind::Command,
            source: RegistrationSource::Handler,
            pipeline: PipelineDecl::None,
            terminal,
        };
        let sets = registry::finalize(vec![pending], Vec::new(), &HashSet::new()).unwrap();
        Arc::clone(&sets.commands[&TypeId::of::<Add>()])
    }

    fn scope_with_handler(seen: Arc<Mutex<Vec<TraceId>>>) -> ServiceScope {
        let mut services = ServiceCollection::new();
        services.register::<AddHandler, _>(Lifetime::Singleton, move |_| {
            Ok(AddHandler { seen: seen.clone() })
        });
        services.build().create_scope()
    }

    #[tokio::test]
    async fn test_root_dispatch_creates_and_tears_down_a_context() {
        let registration = add_registration();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let scope = scope_with_handler(seen.clone());

        assert!(AmbientContext::current().is_none());
        let response = run_dispatch(
            &registration,
            &scope,
            None,
            Box::new(Add { value: 41 }) as BoxedRequest,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(*response.downcast::<u32>().unwrap(), 42);
        assert_eq!(seen.lock().len(), 1);
        assert!(AmbientContext::current().is_none(), "scope must end with the dispatch");
    }

    #[tokio::test]
    async fn test_dispatch_inside_a_scope_joins_the_existing_context() {
        let registration = add_registration();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let scope = scope_with_handler(seen.clone());

        let ambient = AmbientContext::new();
        let trace_id = ambient.trace_id();
        ambient
            .clone()
            .scope(async {
                run_dispatch(
                    &registration,
                    &scope,
                    None,
                    Box::new(Add { value: 1 }) as BoxedRequest,
                    CancellationToken::new(),
                )
                .await
                .unwrap();
            })
            .await;

        assert_eq!(*seen.lock(), vec![trace_id]);
        assert_eq!(ambient.command_id(), None, "operation id must be popped");
    }

    #[tokio::test]
    async fn test_trace_source_seeds_the_root_context() {
        struct Fixed(TraceId);
        impl TraceIdSource for Fixed {
            fn active_trace_id(&self) -> Option<TraceId> {
                Some(self.0)
            }
        }

        let registration = add_registration();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let scope = scope_with_handler(seen.clone());

        let trace_id = TraceId::new();
        let source: Arc<dyn TraceIdSource> = Arc::new(Fixed(trace_id));
        run_dispatch(
            &registration,
            &scope,
            Some(&source),
            Box::new(Add { value: 1 }) as BoxedRequest,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(*seen.lock(), vec![trace_id]);
    }

    #[tokio::test]
    async fn test_unregistered_handler_surfaces_resolution_error() {
        let registration = add_registration();
        let scope = ServiceCollection::new().build().create_scope();

        let err = run_dispatch(
            &registration,
            &scope,
            None,
            Box::new(Add { value: 1 }) as BoxedRequest,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.is::<hermes_core::ResolveError>());
    }

    #[derive(Debug, Clone)]
    struct Fetch;

    impl Query for Fetch {
        type Response = &'static str;
    }

    struct StaticTransport;

    impl QueryTransport<Fetch> for StaticTransport {
        async fn execute(
            &self,
            _query: Fetch,
            _token: CancellationToken,
        ) -> DispatchResult<&'static str> {
            Ok("remote")
        }
    }

    #[tokio::test]
    async fn test_transport_is_built_once_and_reused() {
        let builds = Arc::new(Mutex::new(0_u32));
        let counting = builds.clone();
        let terminal = query_transport_terminal::<Fetch, StaticTransport, _, _>(move |_ctx| {
            *counting.lock() += 1;
            async { Ok(StaticTransport) }
        });

        let scope = ServiceCollection::new().build().create_scope();
        let ctx = MiddlewareContext::new(
            AmbientContext::new(),
            RequestKind::Query,
            "Fetch",
            scope,
        );

        for _ in 0..3 {
            let response = terminal(&ctx, Box::new(Fetch) as BoxedRequest, CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(*response.downcast::<&'static str>().unwrap(), "remote");
        }
        assert_eq!(*builds.lock(), 1);
    }

    #[tokio::test]
    async fn test_failed_transport_build_is_retried_on_next_dispatch() {
        let builds = Arc::new(Mutex::new(0_u32));
        let counting = builds.clone();
        let terminal = query_transport_terminal::<Fetch, StaticTransport, _, _>(move |_ctx| {
            let attempt = {
                let mut builds = counting.lock();
                *builds += 1;
                *builds
            };
            async move {
                if attempt == 1 {
                    Err(DispatchError::msg("endpoint unavailable"))
                } else {
                    Ok(StaticTransport)
                }
            }
        });

        let scope = ServiceCollection::new().build().create_scope();
        let ctx = MiddlewareContext::new(
            AmbientContext::new(),
            RequestKind::Query,
            "Fetch",
            scope,
        );

        let err = terminal(&ctx, Box::new(Fetch) as BoxedRequest, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("endpoint unavailable"));

        let response = terminal(&ctx, Box::new(Fetch) as BoxedRequest, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*response.downcast::<&'static str>().unwrap(), "remote");
        assert_eq!(*builds.lock(), 2);
    }
}
