//! Request contracts and type-erased message plumbing.
//!
//! A command or query is a plain value type implementing [`Command`] or
//! [`Query`]; the associated `Response` type fixes what a dispatch resolves
//! to. Routing is by runtime type identity only, so requests carry no
//! registration metadata of their own.
//!
//! Inside the middleware chain, requests travel as [`BoxedRequest`] values.
//! The [`AnyMessage`] trait keeps them cloneable in erased form, which is what
//! lets a retrying middleware re-run the inner chain with a fresh copy of the
//! original request.

use std::any::Any;

/// A request that may cause side effects.
///
/// `Response` is `()` for fire-and-forget commands. Requests must be `Clone`
/// so a middleware that re-invokes the inner chain can replay them.
///
/// # Example
///
/// ```
/// use hermes_core::Command;
///
/// #[derive(Debug, Clone)]
/// struct IncrementCounter {
///     amount: u64,
/// }
///
/// impl Command for IncrementCounter {
///     type Response = u64;
/// }
/// ```
pub trait Command: Clone + Send + 'static {
    /// The value a successful dispatch of this command resolves to.
    type Response: Send + 'static;
}

/// A side-effect-free request that always produces a response.
pub trait Query: Clone + Send + 'static {
    /// The value a successful dispatch of this query resolves to.
    type Response: Send + 'static;
}

/// Whether a dispatch carries a command or a query.
///
/// The ambient context keeps separate operation-id stacks per kind, so a
/// query issued from inside a command handler never disturbs the command id
/// its caller observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// A command dispatch.
    Command,
    /// A query dispatch.
    Query,
}

impl RequestKind {
    /// Lowercase label for log fields.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Query => "query",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A type-erased request value that can still be cloned.
///
/// Implemented for every `Any + Send + Clone` type, which every [`Command`]
/// and [`Query`] satisfies.
pub trait AnyMessage: Any + Send {
    /// Clones the value behind the erased pointer.
    fn clone_box(&self) -> Box<dyn AnyMessage>;

    /// Borrows the value as [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Converts the boxed value into a boxed [`Any`] for by-value downcasts.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T> AnyMessage for T
where
    T: Any + Send + Clone,
{
    fn clone_box(&self) -> Box<dyn AnyMessage> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

impl Clone for Box<dyn AnyMessage> {
    fn clone(&self) -> Self {
        // Explicit deref: `self.clone_box()` would resolve on the box itself
        // (it satisfies the blanket impl) and recurse into this `clone`.
        (**self).clone_box()
    }
}

/// An erased request moving through a middleware chain.
pub type BoxedRequest = Box<dyn AnyMessage>;

/// An erased response returned by the chain terminal.
pub type BoxedResponse = Box<dyn Any + Send>;

/// The unqualified name of `T`, for log fields and diagnostics.
///
/// Strips the module path (and any generic arguments) from
/// [`std::any::type_name`], so `my_app::billing::ChargeCard` renders as
/// `ChargeCard`.
#[must_use]
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
