//! Transport traits for requests handled outside the local process.
//!
//! A client registration pairs a request type with a transport instead of a
//! handler. The transport owns the remote call: serialization, the wire
//! protocol, and mapping transport failures into [`DispatchError`] are all
//! its business. The engine treats it exactly like a handler terminal, so
//! the client pipeline wraps it the same way a handler pipeline wraps a
//! handler.
//!
//! Transports are built lazily. The builder callback registered with the
//! mediator runs inside the first dispatch through the client, with the
//! ambient context already active, and the instance it produces is shared
//! by every later dispatch through that registration.
//!
//! [`DispatchError`]: hermes_core::DispatchError

use std::future::Future;

use hermes_core::{
    AmbientContext, Command, DispatchResult, Query, ServiceScope,
};
use tokio_util::sync::CancellationToken;

/// Executes a command against a remote destination.
pub trait CommandTransport<C: Command>: Send + Sync + 'static {
    /// Sends the command and resolves with the remote response.
    fn execute(
        &self,
        command: C,
        token: CancellationToken,
    ) -> impl Future<Output = DispatchResult<C::Response>> + Send;
}

/// Executes a query against a remote destination.
pub trait QueryTransport<Q: Query>: Send + Sync + 'static {
    /// Sends the query and resolves with the remote response.
    fn execute(
        &self,
        query: Q,
        token: CancellationToken,
    ) -> impl Future<Output = DispatchResult<Q::Response>> + Send;
}

/// Everything a transport builder callback can see.
///
/// The builder runs inside the first dispatch, so the ambient context
/// carries that dispatch's trace id and operation ids, and the scope is
/// the one the dispatch is resolving services from.
#[derive(Clone)]
pub struct TransportContext {
    ambient: AmbientContext,
    scope: ServiceScope,
}

impl TransportContext {
    pub(crate) fn new(ambient: AmbientContext, scope: ServiceScope) -> Self {
        Self { ambient, scope }
    }

    /// The ambient context of the dispatch that triggered the build.
    #[must_use]
    pub fn ambient(&self) -> &AmbientContext {
        &self.ambient
    }

    /// The service scope the dispatch is running in.
    #[must_use]
    pub fn scope(&self) -> &ServiceScope {
        &self.scope
    }
}
