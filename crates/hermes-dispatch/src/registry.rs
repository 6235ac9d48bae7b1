//! Registration bookkeeping between builder and mediator.
//!
//! The builder collects one [`Pending`] record per `register_*` call. When
//! the mediator is built, the records are validated as a whole and frozen
//! into immutable [`Registration`]s: pipeline declarations run, every
//! referenced middleware is checked against the registered set, and routing
//! conflicts are rejected. After this point nothing about a registration can
//! change, so dispatches read it without locks.
//!
//! Validation enforces the routing rules: a request type maps to exactly one
//! handler or one client, and a handler type serves exactly one request type.
//! Registering the identical request/handler pair twice is harmless and
//! keeps the first record.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use hermes_core::{Pipeline, PipelineBuilder, RequestKind, TerminalFn};

use crate::error::ConfigError;

/// Whether a registration executes locally or through a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationSource {
    /// The request is handled by an in-process handler.
    Handler,
    /// The request is forwarded to a transport.
    Client,
}

impl RegistrationSource {
    /// Lowercase label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Handler => "handler",
            Self::Client => "client",
        }
    }
}

/// How a registration declares its pipeline.
pub(crate) enum PipelineDecl {
    /// The handler type's `configure_pipeline` hook.
    Hook(fn(&mut PipelineBuilder)),
    /// A declaration supplied with a client registration.
    External(Box<dyn FnOnce(&mut PipelineBuilder) + Send>),
    /// No declaration; the pipeline is empty.
    None,
}

/// One `register_*` call, recorded verbatim until build time.
pub(crate) struct Pending {
    pub(crate) request_type: TypeId,
    pub(crate) request_name: &'static str,
    pub(crate) request_type_name: &'static str,
    pub(crate) response_type_name: Option<&'static str>,
    pub(crate) handler_type: TypeId,
    pub(crate) handler_type_name: &'static str,
    pub(crate) kind: RequestKind,
    pub(crate) source: RegistrationSource,
    pub(crate) pipeline: PipelineDecl,
    pub(crate) terminal: Arc<TerminalFn>,
}

/// A finalized route: frozen pipeline plus the terminal that ends it.
pub(crate) struct Registration {
    pub(crate) request_name: &'static str,
    pub(crate) kind: RequestKind,
    pub(crate) pipeline: Pipeline,
    pub(crate) terminal: Arc<TerminalFn>,
    pub(crate) info: RegistrationInfo,
}

/// Introspection record for one finalized registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationInfo {
    request_type: &'static str,
    response_type: Option<&'static str>,
    handler_type: &'static str,
    kind: RequestKind,
    source: RegistrationSource,
}

impl RegistrationInfo {
    /// Full type name of the request.
    #[must_use]
    pub const fn request_type(&self) -> &'static str {
        self.request_type
    }

    /// Full type name of the response, or `None` for unit-response commands.
    #[must_use]
    pub const fn response_type(&self) -> Option<&'static str> {
        self.response_type
    }

    /// Full type name of the handler or transport serving the request.
    #[must_use]
    pub const fn handler_type(&self) -> &'static str {
        self.handler_type
    }

    /// Whether the request is a command or a query.
    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Whether the request runs in-process or through a transport.
    #[must_use]
    pub const fn source(&self) -> RegistrationSource {
        self.source
    }
}

/// Finalized routing tables for both request kinds.
pub(crate) struct RegistrySets {
    pub(crate) commands: HashMap<TypeId, Arc<Registration>>,
    pub(crate) queries: HashMap<TypeId, Arc<Registration>>,
    pub(crate) command_infos: Vec<RegistrationInfo>,
    pub(crate) query_infos: Vec<RegistrationInfo>,
}

impl std::fmt::Debug for RegistrySets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrySets")
            .field("commands", &self.commands.len())
            .field("queries", &self.queries.len())
            .finish_non_exhaustive()
    }
}

/// Validates all pending registrations and freezes their pipelines.
pub(crate) fn finalize(
    commands: Vec<Pending>,
    queries: Vec<Pending>,
    middleware: &HashSet<TypeId>,
) -> Result<RegistrySets, ConfigError> {
    let commands = dedup(commands)?;
    let queries = dedup(queries)?;
    reject_shared_handlers(&commands, &queries)?;

    let (commands, command_infos) = freeze_all(commands, middleware)?;
    let (queries, query_infos) = freeze_all(queries, middleware)?;

    Ok(RegistrySets { commands, queries, command_infos, query_infos })
}

fn dedup(pendings: Vec<Pending>) -> Result<Vec<Pending>, ConfigError> {
    let mut index: HashMap<TypeId, usize> = HashMap::new();
    let mut kept: Vec<Pending> = Vec::with_capacity(pendings.len());

    for pending in pendings {
        let Some(&at) = index.get(&pending.request_type) else {
            index.insert(pending.request_type, kept.len());
            kept.push(pending);
            continue;
        };

        let existing = &kept[at];
        match (existing.source, pending.source) {
            (RegistrationSource::Handler, RegistrationSource::Handler) => {
                if existing.handler_type != pending.handler_type {
                    return Err(ConfigError::DuplicateHandler {
                        request: existing.request_type_name,
                    });
                }
                // identical registration repeated, keep the first
            }
            (RegistrationSource::Client, RegistrationSource::Client) => {
                return Err(ConfigError::DuplicateClient {
                    request: existing.request_type_name,
                });
            }
            _ => {
                return Err(ConfigError::HandlerAndClient {
                    request: existing.request_type_name,
                });
            }
        }
    }

    Ok(kept)
}

fn reject_shared_handlers(
    commands: &[Pending],
    queries: &[Pending],
) -> Result<(), ConfigError> {
    let mut serves: HashMap<TypeId, TypeId> = HashMap::new();
    for pending in commands.iter().chain(queries.iter()) {
        if pending.source != RegistrationSource::Handler {
            continue;
        }
        match serves.get(&pending.handler_type) {
            None => {
                serves.insert(pending.handler_type, pending.request_type);
            }
            Some(&request) if request != pending.request_type => {
                return Err(ConfigError::HandlerForMultipleRequests {
                    handler: pending.handler_type_name,
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

type FrozenSet = (HashMap<TypeId, Arc<Registration>>, Vec<RegistrationInfo>);

fn freeze_all(
    pendings: Vec<Pending>,
    middleware: &HashSet<TypeId>,
) -> Result<FrozenSet, ConfigError> {
    let mut registrations = HashMap::with_capacity(pendings.len());
    let mut infos = Vec::with_capacity(pendings.len());

    for pending in pendings {
        let request_type = pending.request_type;
        let registration = freeze_one(pending, middleware)?;
        infos.push(registration.info);
        registrations.insert(request_type, Arc::new(registration));
    }

    infos.sort_by_key(RegistrationInfo::request_type);
    Ok((registrations, infos))
}

fn freeze_one(
    pending: Pending,
    middleware: &HashSet<TypeId>,
) -> Result<Registration, ConfigError> {
    let pipeline = match pending.pipeline {
        PipelineDecl::Hook(declare) => {
            let mut builder = PipelineBuilder::new();
            declare(&mut builder);
            builder.freeze()?
        }
        PipelineDecl::External(declare) => {
            let mut builder = PipelineBuilder::new();
            declare(&mut builder);
            builder.freeze()?
        }
        PipelineDecl::None => Pipeline::empty(),
    };

    for entry in pipeline.entries() {
        if !middleware.contains(&entry.middleware_type()) {
            return Err(ConfigError::MiddlewareNotRegistered { middleware: entry.name() });
        }
    }

    Ok(Registration {
        request_name: pending.request_name,
        kind: pending.kind,
        pipeline,
        terminal: pending.terminal,
        info: RegistrationInfo {
            request_type: pending.request_type_name,
            response_type: pending.response_type_name,
            handler_type: pending.handler_type_name,
            kind: pending.kind,
            source: pending.source,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use hermes_core::{
        BoxFuture, BoxedRequest, DispatchError, Middleware, MiddlewareContext,
        MiddlewareResult, Next, short_type_name,
    };
    use tokio_util::sync::CancellationToken;

    struct Noop;

    impl Middleware for Noop {
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

    fn unreachable_terminal<'a>(
        _ctx: &'a MiddlewareContext,
        _request: BoxedRequest,
        _token: CancellationToken,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async { Err(DispatchError::msg("terminal not expected to run")) })
    }

    struct FakeRequest;
    struct OtherRequest;
    struct FakeHandler;
    struct OtherHandler;

    fn pending_for<R: 'static, H: 'static>(
        kind: RequestKind,
        source: RegistrationSource,
        pipeline: PipelineDecl,
    ) -> Pending {
        Pending {
            request_type: TypeId::of::<R>(),
            request_name: short_type_name::<R>(),
            request_type_name: std::any::type_name::<R>(),
            response_type_name: Some(std::any::type_name::<u32>()),
            handler_type: TypeId::of::<H>(),
            handler_type_name: std::any::type_name::<H>(),
            kind,
            source,
            pipeline,
            terminal: Arc::new(unreachable_terminal),
        }
    }

    fn handler_pending<R: 'static, H: 'static>() -> Pending {
        pending_for::<R, H>(RequestKind::Command, RegistrationSource::Handler, PipelineDecl::None)
    }

    #[test]
    fn test_identical_registration_is_idempotent() {
        let sets = finalize(
            vec![handler_pending::<FakeRequest, FakeHandler>(),
                 handler_pending::<FakeRequest, FakeHandler>()],
            Vec::new(),
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(sets.commands.len(), 1);
        assert_eq!(sets.command_infos.len(), 1);
    }

    #[test]
    fn test_second_handler_for_same_request_is_rejected() {
        let err = finalize(
            vec![handler_pending::<FakeRequest, FakeHandler>(),
                 handler_pending::<FakeRequest, OtherHandler>()],
            Vec::new(),
            &HashSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateHandler { .. }));
    }

    #[test]
    fn test_handler_plus_client_is_rejected() {
        let err = finalize(
            vec![
                handler_pending::<FakeRequest, FakeHandler>(),
                pending_for::<FakeRequest, OtherHandler>(
                    RequestKind::Command,
                    RegistrationSource::Client,
                    PipelineDecl::None,
                ),
            ],
            Vec::new(),
            &HashSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::HandlerAndClient { .. }));
    }

    #[test]
    fn test_second_client_for_same_request_is_rejected() {
        let client = || {
            pending_for::<FakeRequest, FakeHandler>(
                RequestKind::Command,
                RegistrationSource::Client,
                PipelineDecl::None,
            )
        };
        let err = finalize(vec![client(), client()], Vec::new(), &HashSet::new()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateClient { .. }));
    }

    #[test]
    fn test_handler_shared_across_command_and_query_is_rejected() {
        let command = handler_pending::<FakeRequest, FakeHandler>();
        let query = pending_for::<OtherRequest, FakeHandler>(
            RequestKind::Query,
            RegistrationSource::Handler,
            PipelineDecl::None,
        );

        let err = finalize(vec![command], vec![query], &HashSet::new()).unwrap_err();
        assert!(matches!(err, ConfigError::HandlerForMultipleRequests { .. }));
    }

    #[test]
    fn test_pipeline_with_unregistered_middleware_is_rejected() {
        let pending = pending_for::<FakeRequest, FakeHandler>(
            RequestKind::Command,
            RegistrationSource::Handler,
            PipelineDecl::External(Box::new(|pipeline| {
                pipeline.use_middleware::<Noop>();
            })),
        );
        let err = finalize(vec![pending], Vec::new(), &HashSet::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MiddlewareNotRegistered { middleware: "Noop" }));
    }

    #[test]
    fn test_pipeline_passes_when_middleware_registered() {
        let pending = pending_for::<FakeRequest, FakeHandler>(
            RequestKind::Command,
            RegistrationSource::Handler,
            PipelineDecl::External(Box::new(|pipeline| {
                pipeline.use_middleware::<Noop>();
            })),
        );
        let mut registered = HashSet::new();
        registered.insert(TypeId::of::<Noop>());

        let sets = finalize(vec![pending], Vec::new(), &registered).unwrap();
        let registration = &sets.commands[&TypeId::of::<FakeRequest>()];
        assert_eq!(registration.pipeline.len(), 1);
    }

    #[test]
    fn test_broken_pipeline_declaration_fails_build() {
        let pending = pending_for::<FakeRequest, FakeHandler>(
            RequestKind::Command,
            RegistrationSource::Handler,
            PipelineDecl::External(Box::new(|pipeline| {
                pipeline.configure::<Noop>(());
            })),
        );
        let err = finalize(vec![pending], Vec::new(), &HashSet::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Pipeline(_)));
    }

    #[test]
    fn test_infos_are_sorted_by_request_type() {
        let sets = finalize(
            vec![handler_pending::<OtherRequest, OtherHandler>(),
                 handler_pending::<FakeRequest, FakeHandler>()],
            Vec::new(),
            &HashSet::new(),
        )
        .unwrap();

        let names: Vec<_> =
            sets.command_infos.iter().map(RegistrationInfo::request_type).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
