//! Error types for the dispatch core.
//!
//! Three channels exist. [`ContextError`] covers misuse of a stateful ambient
//! context at call time. [`PipelineError`] covers pipeline declarations that
//! can only be rejected once the whole declaration is known, surfaced when the
//! pipeline is frozen. [`DispatchError`] is the runtime channel: whatever a
//! handler, middleware, or transport fails with travels through it to the
//! caller with its concrete type intact, recoverable via
//! [`DispatchError::downcast_ref`].

use std::error::Error as StdError;
use std::fmt;

/// Result alias for dispatch outcomes.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Invalid-state errors raised by the ambient context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// `activate` was called on a context that is already active.
    #[error("ambient context is already active")]
    AlreadyActive,

    /// The item bag was accessed while the context was not active.
    #[error("ambient context is not active")]
    NotActive,
}

/// Errors recorded by a pipeline builder and surfaced when it is frozen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// `configure` targeted a middleware type with no entry in the pipeline.
    #[error("middleware `{middleware}` cannot be configured before it is added to the pipeline")]
    NotInPipeline {
        /// Type name of the middleware the configure call targeted.
        middleware: &'static str,
    },
}

impl PipelineError {
    /// Creates a configure-before-use error for the named middleware type.
    #[must_use]
    pub const fn not_in_pipeline(middleware: &'static str) -> Self {
        Self::NotInPipeline { middleware }
    }
}

/// The error value a dispatch resolves to.
///
/// Wraps any `std::error::Error + Send + Sync` without erasing its concrete
/// type: the engine never translates or annotates a failure, so the value the
/// caller receives downcasts back to exactly what the handler, middleware, or
/// transport produced.
///
/// # Example
///
/// ```
/// use hermes_core::DispatchError;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("no such user")]
/// struct UserNotFound;
///
/// let err = DispatchError::from(UserNotFound);
/// assert!(err.is::<UserNotFound>());
/// ```
pub struct DispatchError(anyhow::Error);

impl DispatchError {
    /// Wraps a concrete error value.
    #[must_use]
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(anyhow::Error::new(error))
    }

    /// Creates an error from a display-able message.
    #[must_use]
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(anyhow::Error::msg(message))
    }

    /// Returns true if the wrapped error is of type `E`.
    #[must_use]
    pub fn is<E>(&self) -> bool
    where
        E: StdError + Send + Sync + 'static,
    {
        self.0.is::<E>()
    }

    /// Borrows the wrapped error as `E` if that is its concrete type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Recovers the wrapped error by value if its concrete type is `E`.
    ///
    /// # Errors
    ///
    /// Returns `self` unchanged when the wrapped error is not an `E`.
    pub fn downcast<E>(self) -> Result<E, Self>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.0.downcast::<E>().map_err(Self)
    }

    /// Consumes the wrapper, yielding the underlying [`anyhow::Error`].
    #[must_use]
    pub fn into_inner(self) -> anyhow::Error {
        self.0
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

// DispatchError must not implement std::error::Error: the blanket conversion
// below would then collide with the reflexive From impl.
impl<E> From<E> for DispatchError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self(anyhow::Error::new(error))
    }
}

impl AsRef<anyhow::Error> for DispatchError {
    fn as_ref(&self) -> &anyhow::Error {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("widget {0} exploded")]
    struct WidgetError(u32);

    #[test]
    fn test_dispatch_error_preserves_concrete_type() {
        let err = DispatchError::from(WidgetError(7));
        assert!(err.is::<WidgetError>());
        assert_eq!(err.downcast_ref::<WidgetError>(), Some(&WidgetError(7)));
    }

    #[test]
    fn test_dispatch_error_downcast_by_value() {
        let err = DispatchError::from(WidgetError(3));
        let recovered = err.downcast::<WidgetError>().expect("type should match");
        assert_eq!(recovered, WidgetError(3));
    }

    #[test]
    fn test_dispatch_error_downcast_wrong_type_returns_self() {
        let err = DispatchError::msg("plain message");
        let err = err
            .downcast::<WidgetError>()
            .expect_err("message errors are not WidgetError");
        assert_eq!(err.to_string(), "plain message");
    }

    #[test]
    fn test_dispatch_error_display_matches_source() {
        let err = DispatchError::from(WidgetError(9));
        assert_eq!(err.to_string(), "widget 9 exploded");
    }

    #[test]
    fn test_context_error_display() {
        assert_eq!(
            ContextError::AlreadyActive.to_string(),
            "ambient context is already active"
        );
        assert_eq!(
            ContextError::NotActive.to_string(),
            "ambient context is not active"
        );
    }

    #[test]
    fn test_pipeline_error_names_middleware() {
        let err = PipelineError::not_in_pipeline("RetryMiddleware");
        assert!(err.to_string().contains("RetryMiddleware"));
    }
}
