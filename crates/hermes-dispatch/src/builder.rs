//! Mediator construction.
//!
//! All configuration flows through [`MediatorBuilder`]: services, middlewares,
//! handlers, and clients are declared up front, and [`MediatorBuilder::build`]
//! validates the whole configuration at once. A broken configuration never
//! survives to dispatch time.

use std::any::TypeId;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use hermes_core::{
    short_type_name, Command, CommandHandler, FnCommandHandler, FnQueryHandler, Lifetime,
    Middleware, PipelineBuilder, Query, QueryHandler, RequestKind, ResolveError,
    ServiceCollection, ServiceScope, TerminalFn, TraceIdSource,
};
use tokio_util::sync::CancellationToken;

use crate::error::ConfigError;
use crate::executor;
use crate::mediator::Mediator;
use crate::registry::{self, Pending, PipelineDecl, RegistrationSource};
use crate::transport::{CommandTransport, QueryTransport, TransportContext};

/// Collects registrations and finalizes them into a [`Mediator`].
///
/// # Example
///
/// ```
/// use hermes_core::{Command, CommandHandler, DispatchResult, Lifetime};
/// use hermes_dispatch::MediatorBuilder;
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Debug, Clone)]
/// struct Greet {
///     name: String,
/// }
///
/// impl Command for Greet {
///     type Response = String;
/// }
///
/// struct GreetHandler;
///
/// impl CommandHandler<Greet> for GreetHandler {
///     async fn handle(&self, command: Greet, _token: CancellationToken) -> DispatchResult<String> {
///         Ok(format!("hello, {}", command.name))
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mediator = MediatorBuilder::new()
///     .register_command_handler(Lifetime::Scoped, |_| Ok(GreetHandler))
///     .build()
///     .unwrap();
///
/// let client = mediator.scope().command_client::<Greet>().unwrap();
/// let response = client
///     .execute(Greet { name: "hermes".into() }, CancellationToken::new())
///     .await
///     .unwrap();
/// assert_eq!(response, "hello, hermes");
/// # }
/// ```
#[derive(Default)]
pub struct MediatorBuilder {
    services: ServiceCollection,
    commands: Vec<Pending>,
    queries: Vec<Pending>,
    middleware: HashSet<TypeId>,
    trace_source: Option<Arc<dyn TraceIdSource>>,
}

impl MediatorBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the source consulted for an external distributed-trace id
    /// whenever a root dispatch creates its ambient context.
    #[must_use]
    pub fn with_trace_source<S: TraceIdSource>(mut self, source: S) -> Self {
        self.trace_source = Some(Arc::new(source));
        self
    }

    /// Registers an application service resolvable from dispatch scopes.
    ///
    /// The factory runs according to `lifetime`: per resolution for
    /// transient, once per scope for scoped, once per mediator for
    /// singleton. Registering the same type again replaces the earlier
    /// registration.
    #[must_use]
    pub fn register_service<T, F>(mut self, lifetime: Lifetime, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceScope) -> Result<T, ResolveError> + Send + Sync + 'static,
    {
        self.services.register::<T, F>(lifetime, factory);
        self
    }

    /// Registers an already constructed service as a singleton.
    #[must_use]
    pub fn register_service_instance<T>(mut self, instance: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.services.register_instance(instance);
        self
    }

    /// Registers a middleware type, making it referenceable from pipelines.
    ///
    /// The lifetime governs instance identity per chain execution: a
    /// transient middleware is constructed anew every time an execution
    /// reaches one of its pipeline entries, a singleton keeps state across
    /// every dispatch.
    #[must_use]
    pub fn register_middleware<M, F>(mut self, lifetime: Lifetime, factory: F) -> Self
    where
        M: Middleware,
        F: Fn(&ServiceScope) -> Result<M, ResolveError> + Send + Sync + 'static,
    {
        self.services.register::<M, F>(lifetime, factory);
        self.middleware.insert(TypeId::of::<M>());
        self
    }

    /// Registers an in-process handler for command type `C`.
    ///
    /// The handler's `configure_pipeline` hook declares its middleware
    /// pipeline. Registering a second, different handler type for `C` fails
    /// at [`MediatorBuilder::build`]; registering the identical pair again
    /// is a no-op.
    #[must_use]
    pub fn register_command_handler<C, H, F>(mut self, lifetime: Lifetime, factory: F) -> Self
    where
        C: Command,
        H: CommandHandler<C>,
        F: Fn(&ServiceScope) -> Result<H, ResolveError> + Send + Sync + 'static,
    {
        self.services.register::<H, F>(lifetime, factory);
        self.commands.push(command_handler_pending::<C, H>());
        self
    }

    /// Registers an in-process handler for query type `Q`.
    #[must_use]
    pub fn register_query_handler<Q, H, F>(mut self, lifetime: Lifetime, factory: F) -> Self
    where
        Q: Query,
        H: QueryHandler<Q>,
        F: Fn(&ServiceScope) -> Result<H, ResolveError> + Send + Sync + 'static,
    {
        self.services.register::<H, F>(lifetime, factory);
        self.queries.push(query_handler_pending::<Q, H>());
        self
    }

    /// Registers an async closure as the handler for command type `C`.
    ///
    /// The closure is wrapped in [`FnCommandHandler`] and registered as a
    /// singleton; it declares no pipeline.
    #[must_use]
    pub fn register_command_fn<C, F, Fut>(mut self, handler: F) -> Self
    where
        C: Command,
        F: Fn(C, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = hermes_core::DispatchResult<C::Response>> + Send + 'static,
    {
        self.services.register_instance(FnCommandHandler::new(handler));
        self.commands.push(command_handler_pending::<C, FnCommandHandler<C, F, Fut>>());
        self
    }

    /// Registers an async closure as the handler for query type `Q`.
    #[must_use]
    pub fn register_query_fn<Q, F, Fut>(mut self, handler: F) -> Self
    where
        Q: Query,
        F: Fn(Q, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = hermes_core::DispatchResult<Q::Response>> + Send + 'static,
    {
        self.services.register_instance(FnQueryHandler::new(handler));
        self.queries.push(query_handler_pending::<Q, FnQueryHandler<Q, F, Fut>>());
        self
    }

    /// Registers a client for command type `C`, backed by a transport.
    ///
    /// `build` runs inside the first dispatch through the client, with the
    /// ambient context already established; the transport it returns is
    /// shared by all later dispatches. The client runs with an empty
    /// pipeline; use
    /// [`MediatorBuilder::register_command_client_with_pipeline`] to declare
    /// one.
    #[must_use]
    pub fn register_command_client<C, T, F, Fut>(self, build: F) -> Self
    where
        C: Command,
        T: CommandTransport<C>,
        F: Fn(TransportContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = hermes_core::DispatchResult<T>> + Send + 'static,
    {
        self.command_client_pending::<C, T, F, Fut>(build, PipelineDecl::None)
    }

    /// Registers a client for command type `C` with its own pipeline.
    ///
    /// The declaration stands alone; no handler hook is consulted for a
    /// client registration.
    #[must_use]
    pub fn register_command_client_with_pipeline<C, T, F, Fut, P>(
        self,
        build: F,
        configure: P,
    ) -> Self
    where
        C: Command,
        T: CommandTransport<C>,
        F: Fn(TransportContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = hermes_core::DispatchResult<T>> + Send + 'static,
        P: FnOnce(&mut PipelineBuilder) + Send + 'static,
    {
        self.command_client_pending::<C, T, F, Fut>(
            build,
            PipelineDecl::External(Box::new(configure)),
        )
    }

    /// Registers a client for query type `Q`, backed by a transport.
    #[must_use]
    pub fn register_query_client<Q, T, F, Fut>(self, build: F) -> Self
    where
        Q: Query,
        T: QueryTransport<Q>,
        F: Fn(TransportContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = hermes_core::DispatchResult<T>> + Send + 'static,
    {
        self.query_client_pending::<Q, T, F, Fut>(build, PipelineDecl::None)
    }

    /// Registers a client for query type `Q` with its own pipeline.
    #[must_use]
    pub fn register_query_client_with_pipeline<Q, T, F, Fut, P>(
        self,
        build: F,
        configure: P,
    ) -> Self
    where
        Q: Query,
        T: QueryTransport<Q>,
        F: Fn(TransportContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = hermes_core::DispatchResult<T>> + Send + 'static,
        P: FnOnce(&mut PipelineBuilder) + Send + 'static,
    {
        self.query_client_pending::<Q, T, F, Fut>(
            build,
            PipelineDecl::External(Box::new(configure)),
        )
    }

    /// Validates every registration and produces the mediator.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for routing conflicts, pipelines that
    /// reference unregistered middlewares, and invalid pipeline
    /// declarations. Nothing is deferred to dispatch time.
    pub fn build(self) -> Result<Mediator, ConfigError> {
        let sets = registry::finalize(self.commands, self.queries, &self.middleware)?;
        tracing::debug!(
            commands = sets.command_infos.len(),
            queries = sets.query_infos.len(),
            middlewares = self.middleware.len(),
            "mediator configuration finalized"
        );
        Ok(Mediator::new(self.services.build(), sets, self.trace_source))
    }

    fn command_client_pending<C, T, F, Fut>(mut self, build: F, pipeline: PipelineDecl) -> Self
    where
        C: Command,
        T: CommandTransport<C>,
        F: Fn(TransportContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = hermes_core::DispatchResult<T>> + Send + 'static,
    {
        let terminal = executor::command_transport_terminal::<C, T, F, Fut>(build);
        self.commands.push(Pending {
            request_type: TypeId::of::<C>(),
            request_name: short_type_name::<C>(),
            request_type_name: std::any::type_name::<C>(),
            response_type_name: response_name::<C::Response>(),
            handler_type: TypeId::of::<T>(),
            handler_type_name: std::any::type_name::<T>(),
            kind: RequestKind::Command,
            source: RegistrationSource::Client,
            pipeline,
            terminal,
        });
        self
    }

    fn query_client_pending<Q, T, F, Fut>(mut self, build: F, pipeline: PipelineDecl) -> Self
    where
        Q: Query,
        T: QueryTransport<Q>,
        F: Fn(TransportContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = hermes_core::DispatchResult<T>> + Send + 'static,
    {
        let terminal = executor::query_transport_terminal::<Q, T, F, Fut>(build);
        self.queries.push(Pending {
            request_type: TypeId::of::<Q>(),
            request_name: short_type_name::<Q>(),
            request_type_name: std::any::type_name::<Q>(),
            response_type_name: Some(std::any::type_name::<Q::Response>()),
            handler_type: TypeId::of::<T>(),
            handler_type_name: std::any::type_name::<T>(),
            kind: RequestKind::Query,
            source: RegistrationSource::Client,
            pipeline,
            terminal,
        });
        self
    }
}

impl std::fmt::Debug for MediatorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediatorBuilder")
            .field("commands", &self.commands.len())
            .field("queries", &self.queries.len())
            .field("middlewares", &self.middleware.len())
            .field("services", &self.services.len())
            .finish_non_exhaustive()
    }
}

fn command_handler_pending<C, H>() -> Pending
where
    C: Command,
    H: CommandHandler<C>,
{
    let terminal: Arc<TerminalFn> = Arc::new(executor::command_terminal::<C, H>);
    Pending {
        request_type: TypeId::of::<C>(),
        request_name: short_type_name::<C>(),
        request_type_name: std::any::type_name::<C>(),
        response_type_name: response_name::<C::Response>(),
        handler_type: TypeId::of::<H>(),
        handler_type_name: std::any::type_name::<H>(),
        kind: RequestKind::Command,
        source: RegistrationSource::Handler,
        pipeline: PipelineDecl::Hook(<H as CommandHandler<C>>::configure_pipeline),
        terminal,
    }
}

fn query_handler_pending<Q, H>() -> Pending
where
    Q: Query,
    H: QueryHandler<Q>,
{
    let terminal: Arc<TerminalFn> = Arc::new(executor::query_terminal::<Q, H>);
    Pending {
        request_type: TypeId::of::<Q>(),
        request_name: short_type_name::<Q>(),
        request_type_name: std::any::type_name::<Q>(),
        response_type_name: Some(std::any::type_name::<Q::Response>()),
        handler_type: TypeId::of::<H>(),
        handler_type_name: std::any::type_name::<H>(),
        kind: RequestKind::Query,
        source: RegistrationSource::Handler,
        pipeline: PipelineDecl::Hook(<H as QueryHandler<Q>>::configure_pipeline),
        terminal,
    }
}

// A command whose response is the unit type reports no response type at all.
fn response_name<R: 'static>() -> Option<&'static str> {
    (TypeId::of::<R>() != TypeId::of::<()>()).then_some(std::any::type_name::<R>())
}

#[cfg(test)]
mod tests {
    use super::*;

    use hermes_core::{
        BoxFuture, BoxedRequest, DispatchResult, MiddlewareContext, MiddlewareResult, Next,
    };

    #[derive(Debug, Clone)]
    struct Deposit {
        amount: u64,
    }

    impl Command for Deposit {
        type Response = u64;
    }

    #[derive(Debug, Clone)]
    struct Balance;

    impl Query for Balance {
        type Response = u64;
    }

    struct DepositHandler;

    impl CommandHandler<Deposit> for DepositHandler {
        async fn handle(
            &self,
            command: Deposit,
            _token: CancellationToken,
        ) -> DispatchResult<u64> {
            Ok(command.amount)
        }
    }

    struct OtherDepositHandler;

    impl CommandHandler<Deposit> for OtherDepositHandler {
        async fn handle(
            &self,
            command: Deposit,
            _token: CancellationToken,
        ) -> DispatchResult<u64> {
            Ok(command.amount * 2)
        }
    }

    struct Audit;

    impl Middleware for Audit {
        type Config = ();

        fn execute<'a>(
            &'a self,
            ctx: &'a MiddlewareContext,
            _config: &'a Self::Config,
            request: BoxedRequest,
            token: CancellationToken,
            mut next: Next<'a>,
        ) -> BoxFuture<'a, MiddlewareResult> {
            Box::pin(async move { next.run(ctx, request, token).await })
        }
    }

    struct AuditedHandler;

    impl CommandHandler<Deposit> for AuditedHandler {
        async fn handle(
            &self,
            command: Deposit,
            _token: CancellationToken,
        ) -> DispatchResult<u64> {
            Ok(command.amount)
        }

        fn configure_pipeline(pipeline: &mut PipelineBuilder) {
            pipeline.use_middleware::<Audit>();
        }
    }

    struct DepositTransport;

    impl CommandTransport<Deposit> for DepositTransport {
        async fn execute(
            &self,
            command: Deposit,
            _token: CancellationToken,
        ) -> DispatchResult<u64> {
            Ok(command.amount + 100)
        }
    }

    #[test]
    fn test_build_succeeds_with_valid_registrations() {
        let mediator = MediatorBuilder::new()
            .register_command_handler(Lifetime::Scoped, |_| Ok(DepositHandler))
            .register_query_fn(|_query: Balance, _token| async { Ok(7_u64) })
            .build()
            .unwrap();

        assert_eq!(mediator.command_registrations().len(), 1);
        assert_eq!(mediator.query_registrations().len(), 1);
    }

    #[test]
    fn test_registering_same_handler_twice_is_idempotent() {
        let mediator = MediatorBuilder::new()
            .register_command_handler(Lifetime::Scoped, |_| Ok(DepositHandler))
            .register_command_handler(Lifetime::Scoped, |_| Ok(DepositHandler))
            .build()
            .unwrap();

        assert_eq!(mediator.command_registrations().len(), 1);
    }

    #[test]
    fn test_conflicting_handlers_fail_build() {
        let err = MediatorBuilder::new()
            .register_command_handler(Lifetime::Scoped, |_| Ok(DepositHandler))
            .register_command_handler(Lifetime::Scoped, |_| Ok(OtherDepositHandler))
            .build()
            .unwrap_err();

        assert!(matches!(err, ConfigError::DuplicateHandler { .. }));
    }

    #[test]
    fn test_handler_and_client_for_same_command_fail_build() {
        let err = MediatorBuilder::new()
            .register_command_handler(Lifetime::Scoped, |_| Ok(DepositHandler))
            .register_command_client::<Deposit, DepositTransport, _, _>(|_ctx| async {
                Ok(DepositTransport)
            })
            .build()
            .unwrap_err();

        assert!(matches!(err, ConfigError::HandlerAndClient { .. }));
    }

    #[test]
    fn test_pipeline_referencing_unregistered_middleware_fails_build() {
        let err = MediatorBuilder::new()
            .register_command_handler(Lifetime::Scoped, |_| Ok(AuditedHandler))
            .build()
            .unwrap_err();

        assert!(matches!(err, ConfigError::MiddlewareNotRegistered { middleware: "Audit" }));
    }

    #[test]
    fn test_registered_middleware_satisfies_pipeline_reference() {
        let mediator = MediatorBuilder::new()
            .register_middleware(Lifetime::Transient, |_| Ok(Audit))
            .register_command_handler(Lifetime::Scoped, |_| Ok(AuditedHandler))
            .build()
            .unwrap();

        assert_eq!(mediator.command_registrations().len(), 1);
    }

    #[test]
    fn test_client_pipeline_declaration_errors_fail_build() {
        let err = MediatorBuilder::new()
            .register_command_client_with_pipeline::<Deposit, DepositTransport, _, _, _>(
                |_ctx| async { Ok(DepositTransport) },
                |pipeline| {
                    pipeline.configure::<Audit>(());
                },
            )
            .build()
            .unwrap_err();

        assert!(matches!(err, ConfigError::Pipeline(_)));
    }

    #[test]
    fn test_unit_response_commands_report_no_response_type() {
        #[derive(Debug, Clone)]
        struct Notify;

        impl Command for Notify {
            type Response = ();
        }

        let mediator = MediatorBuilder::new()
            .register_command_fn(|_command: Notify, _token| async { Ok(()) })
            .build()
            .unwrap();

        let info = &mediator.command_registrations()[0];
        assert_eq!(info.response_type(), None);
        assert!(info.request_type().ends_with("Notify"));
    }
}
