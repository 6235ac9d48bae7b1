//! Configuration errors raised while building the mediator.
//!
//! Everything here surfaces synchronously from [`MediatorBuilder::build`]
//! (or from client acquisition), never from a dispatch. A misconfigured
//! engine fails before the application starts taking traffic.
//!
//! [`MediatorBuilder::build`]: crate::MediatorBuilder::build

use hermes_core::PipelineError;

/// A registration or pipeline declaration the engine refuses to finalize.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Two different handler types were registered for one request type.
    #[error("request type `{request}` already has a registered handler")]
    DuplicateHandler {
        /// The conflicting request type.
        request: &'static str,
    },

    /// Two clients were registered for one request type.
    #[error("request type `{request}` already has a registered client")]
    DuplicateClient {
        /// The conflicting request type.
        request: &'static str,
    },

    /// A request type has both an in-process handler and a client.
    #[error("request type `{request}` cannot have both a handler and a client")]
    HandlerAndClient {
        /// The conflicting request type.
        request: &'static str,
    },

    /// One handler type was registered for more than one request type.
    #[error("handler type `{handler}` is registered for more than one request type")]
    HandlerForMultipleRequests {
        /// The offending handler type.
        handler: &'static str,
    },

    /// A pipeline references a middleware that was never registered.
    #[error("middleware `{middleware}` is used by a pipeline but was never registered")]
    MiddlewareNotRegistered {
        /// The unregistered middleware type.
        middleware: &'static str,
    },

    /// A client was requested for a request type with no registration.
    #[error("request type `{request}` has no registered handler or client")]
    UnknownRequest {
        /// The unregistered request type.
        request: &'static str,
    },

    /// A pipeline declaration itself was invalid.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
