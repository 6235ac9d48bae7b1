//! The finalized mediator and its dispatch scopes.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use hermes_core::{Command, Query, ResolveError, ServiceProvider, ServiceScope, TraceIdSource};

use crate::clients::{CommandClient, QueryClient};
use crate::error::ConfigError;
use crate::registry::{Registration, RegistrationInfo, RegistrySets};

struct MediatorInner {
    provider: ServiceProvider,
    commands: HashMap<TypeId, Arc<Registration>>,
    queries: HashMap<TypeId, Arc<Registration>>,
    command_infos: Vec<RegistrationInfo>,
    query_infos: Vec<RegistrationInfo>,
    trace_source: Option<Arc<dyn TraceIdSource>>,
}

/// Immutable routing tables plus the service provider behind them.
///
/// Built once by [`MediatorBuilder`](crate::MediatorBuilder), then shared
/// freely; clones are handles to the same mediator. Dispatching goes through
/// a [`MediatorScope`], which fixes the resolution scope for scoped-lifetime
/// services.
#[derive(Clone)]
pub struct Mediator {
    inner: Arc<MediatorInner>,
}

impl Mediator {
    pub(crate) fn new(
        provider: ServiceProvider,
        sets: RegistrySets,
        trace_source: Option<Arc<dyn TraceIdSource>>,
    ) -> Self {
        Self {
            inner: Arc::new(MediatorInner {
                provider,
                commands: sets.commands,
                queries: sets.queries,
                command_infos: sets.command_infos,
                query_infos: sets.query_infos,
                trace_source,
            }),
        }
    }

    /// Opens a new dispatch scope.
    ///
    /// Everything resolved through one scope shares its scoped-lifetime
    /// instances; separate scopes are isolated. A server typically opens one
    /// scope per inbound request.
    #[must_use]
    pub fn scope(&self) -> MediatorScope {
        MediatorScope {
            inner: Arc::clone(&self.inner),
            scope: self.inner.provider.create_scope(),
        }
    }

    /// All finalized command registrations, sorted by request type name.
    #[must_use]
    pub fn command_registrations(&self) -> &[RegistrationInfo] {
        &self.inner.command_infos
    }

    /// All finalized query registrations, sorted by request type name.
    #[must_use]
    pub fn query_registrations(&self) -> &[RegistrationInfo] {
        &self.inner.query_infos
    }
}

impl std::fmt::Debug for Mediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mediator")
            .field("commands", &self.inner.command_infos.len())
            .field("queries", &self.inner.query_infos.len())
            .finish_non_exhaustive()
    }
}

/// One resolution scope over the mediator.
///
/// Clones share the same scope; use [`Mediator::scope`] for an isolated one.
#[derive(Clone)]
pub struct MediatorScope {
    inner: Arc<MediatorInner>,
    scope: ServiceScope,
}

impl MediatorScope {
    /// Obtains the typed client for command type `C`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownRequest`] when `C` has no registration,
    /// so acquiring a client fails fast instead of failing on first use.
    pub fn command_client<C: Command>(&self) -> Result<CommandClient<C>, ConfigError> {
        let registration = self
            .inner
            .commands
            .get(&TypeId::of::<C>())
            .ok_or(ConfigError::UnknownRequest { request: std::any::type_name::<C>() })?;
        Ok(CommandClient::new(
            Arc::clone(registration),
            self.scope.clone(),
            self.inner.trace_source.clone(),
        ))
    }

    /// Obtains the typed client for query type `Q`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownRequest`] when `Q` has no registration.
    pub fn query_client<Q: Query>(&self) -> Result<QueryClient<Q>, ConfigError> {
        let registration = self
            .inner
            .queries
            .get(&TypeId::of::<Q>())
            .ok_or(ConfigError::UnknownRequest { request: std::any::type_name::<Q>() })?;
        Ok(QueryClient::new(
            Arc::clone(registration),
            self.scope.clone(),
            self.inner.trace_source.clone(),
        ))
    }

    /// Resolves a registered service from this scope.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when `T` was never registered or its factory
    /// fails.
    pub fn resolve<T>(&self) -> Result<Arc<T>, ResolveError>
    where
        T: Send + Sync + 'static,
    {
        self.scope.resolve::<T>()
    }
}

impl std::fmt::Debug for MediatorScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediatorScope").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hermes_core::{DispatchResult, Lifetime};
    use tokio_util::sync::CancellationToken;

    use crate::MediatorBuilder;

    #[derive(Debug, Clone)]
    struct Ping;

    impl Command for Ping {
        type Response = u32;
    }

    #[derive(Debug, Clone)]
    struct Missing;

    impl Query for Missing {
        type Response = u32;
    }

    fn mediator() -> Mediator {
        MediatorBuilder::new()
            .register_command_fn(|_command: Ping, _token| async { Ok(1_u32) })
            .register_service(Lifetime::Scoped, |_| Ok(String::from("shared")))
            .build()
            .unwrap()
    }

    #[test]
    fn test_client_acquisition_fails_fast_for_unknown_requests() {
        let scope = mediator().scope();
        assert!(scope.command_client::<Ping>().is_ok());

        let err = scope.query_client::<Missing>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRequest { .. }));
        assert!(err.to_string().contains("Missing"));
    }

    #[tokio::test]
    async fn test_scope_resolves_registered_services() {
        let scope = mediator().scope();
        let first = scope.resolve::<String>().unwrap();
        let second = scope.resolve::<String>().unwrap();
        assert!(Arc::ptr_eq(&first, &second), "scoped services share one instance");

        let _ = scope
            .command_client::<Ping>()
            .unwrap()
            .execute(Ping, CancellationToken::new())
            .await
            .unwrap();
    }

    #[test]
    fn test_separate_scopes_do_not_share_scoped_instances() {
        let mediator = mediator();
        let a = mediator.scope().resolve::<String>().unwrap();
        let b = mediator.scope().resolve::<String>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
