//! Typed request clients.
//!
//! A client is the caller-facing handle for one request type, obtained from a
//! [`MediatorScope`](crate::MediatorScope). It carries the finalized
//! registration and the scope it was created in, so acquiring one cannot fail
//! later with a routing miss; every dispatch through it runs the same frozen
//! pipeline against handlers resolved from that scope.
//!
//! Clients are cheap to clone and safe to call concurrently. Whether the
//! terminal is an in-process handler or a remote transport is invisible here.

use std::marker::PhantomData;
use std::sync::Arc;

use hermes_core::{
    BoxedRequest, BoxedResponse, Command, DispatchError, DispatchResult, Query, ServiceScope,
    TraceIdSource,
};
use tokio_util::sync::CancellationToken;

use crate::executor;
use crate::registry::{Registration, RegistrationInfo};

/// Dispatches one command type.
pub struct CommandClient<C: Command> {
    registration: Arc<Registration>,
    scope: ServiceScope,
    trace_source: Option<Arc<dyn TraceIdSource>>,
    _request: PhantomData<fn(C)>,
}

impl<C: Command> CommandClient<C> {
    pub(crate) fn new(
        registration: Arc<Registration>,
        scope: ServiceScope,
        trace_source: Option<Arc<dyn TraceIdSource>>,
    ) -> Self {
        Self { registration, scope, trace_source, _request: PhantomData }
    }

    /// Runs the command through its pipeline and handler.
    ///
    /// `token` is handed to every middleware and to the handler; cancelling
    /// it is only as effective as those layers are cooperative.
    ///
    /// # Errors
    ///
    /// Returns whatever error the handler, a middleware, or the transport
    /// produced, with its concrete type preserved.
    pub async fn execute(
        &self,
        command: C,
        token: CancellationToken,
    ) -> DispatchResult<C::Response> {
        let response = executor::run_dispatch(
            &self.registration,
            &self.scope,
            self.trace_source.as_ref(),
            Box::new(command) as BoxedRequest,
            token,
        )
        .await?;
        downcast_response::<C::Response>(response, self.registration.request_name)
    }

    /// Introspection record of the registration this client dispatches to.
    #[must_use]
    pub fn info(&self) -> &RegistrationInfo {
        &self.registration.info
    }
}

impl<C: Command> Clone for CommandClient<C> {
    fn clone(&self) -> Self {
        Self {
            registration: Arc::clone(&self.registration),
            scope: self.scope.clone(),
            trace_source: self.trace_source.clone(),
            _request: PhantomData,
        }
    }
}

impl<C: Command> std::fmt::Debug for CommandClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandClient")
            .field("request", &self.registration.request_name)
            .finish_non_exhaustive()
    }
}

/// Dispatches one query type.
pub struct QueryClient<Q: Query> {
    registration: Arc<Registration>,
    scope: ServiceScope,
    trace_source: Option<Arc<dyn TraceIdSource>>,
    _request: PhantomData<fn(Q)>,
}

impl<Q: Query> QueryClient<Q> {
    pub(crate) fn new(
        registration: Arc<Registration>,
        scope: ServiceScope,
        trace_source: Option<Arc<dyn TraceIdSource>>,
    ) -> Self {
        Self { registration, scope, trace_source, _request: PhantomData }
    }

    /// Runs the query through its pipeline and handler.
    ///
    /// # Errors
    ///
    /// Returns whatever error the handler, a middleware, or the transport
    /// produced, with its concrete type preserved.
    pub async fn execute(
        &self,
        query: Q,
        token: CancellationToken,
    ) -> DispatchResult<Q::Response> {
        let response = executor::run_dispatch(
            &self.registration,
            &self.scope,
            self.trace_source.as_ref(),
            Box::new(query) as BoxedRequest,
            token,
        )
        .await?;
        downcast_response::<Q::Response>(response, self.registration.request_name)
    }

    /// Introspection record of the registration this client dispatches to.
    #[must_use]
    pub fn info(&self) -> &RegistrationInfo {
        &self.registration.info
    }
}

impl<Q: Query> Clone for QueryClient<Q> {
    fn clone(&self) -> Self {
        Self {
            registration: Arc::clone(&self.registration),
            scope: self.scope.clone(),
            trace_source: self.trace_source.clone(),
            _request: PhantomData,
        }
    }
}

impl<Q: Query> std::fmt::Debug for QueryClient<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("request", &self.registration.request_name)
            .finish_non_exhaustive()
    }
}

// A middleware that short-circuits is obliged to answer with the request's
// declared response type; anything else surfaces here instead of panicking.
fn downcast_response<R: Send + 'static>(
    response: BoxedResponse,
    request_name: &'static str,
) -> DispatchResult<R> {
    response.downcast::<R>().map(|response| *response).map_err(|_| {
        DispatchError::msg(format!(
            "response for `{request_name}` arrived with an unexpected type"
        ))
    })
}
