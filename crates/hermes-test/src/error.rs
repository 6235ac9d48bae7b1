//! Failure injection.

/// An error tests inject into handlers, middlewares, and transports.
///
/// The dispatch error channel promises to deliver failures with their
/// concrete type intact; tests assert that promise by injecting a
/// `TestFailure` at one end and downcasting at the other.
///
/// # Example
///
/// ```
/// use hermes_core::DispatchError;
/// use hermes_test::TestFailure;
///
/// let err = DispatchError::from(TestFailure::new("storage offline"));
/// assert_eq!(err.downcast_ref::<TestFailure>(), Some(&TestFailure::new("storage offline")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("injected failure: {reason}")]
pub struct TestFailure {
    /// What the injected failure pretends went wrong.
    pub reason: &'static str,
}

impl TestFailure {
    /// A failure with the given reason.
    #[must_use]
    pub const fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}
