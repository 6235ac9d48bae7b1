//! Deterministic trace-id sources.

use hermes_core::{TraceId, TraceIdSource};

/// A trace-id source that always gives the same answer.
///
/// Wire it into the engine under test to pin the trace id every root
/// dispatch starts from, or use [`FixedTraceSource::inactive`] to exercise
/// the fallback path where no external trace is active.
///
/// # Example
///
/// ```
/// use hermes_core::{TraceId, TraceIdSource};
/// use hermes_test::FixedTraceSource;
///
/// let trace_id = TraceId::new();
/// let source = FixedTraceSource::new(trace_id);
/// assert_eq!(source.active_trace_id(), Some(trace_id));
/// assert_eq!(FixedTraceSource::inactive().active_trace_id(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedTraceSource {
    trace_id: Option<TraceId>,
}

impl FixedTraceSource {
    /// A source reporting `trace_id` as the active trace.
    #[must_use]
    pub const fn new(trace_id: TraceId) -> Self {
        Self { trace_id: Some(trace_id) }
    }

    /// A source reporting that no trace is active.
    #[must_use]
    pub const fn inactive() -> Self {
        Self { trace_id: None }
    }

    /// The id this source reports, if any.
    #[must_use]
    pub const fn trace_id(&self) -> Option<TraceId> {
        self.trace_id
    }
}

impl TraceIdSource for FixedTraceSource {
    fn active_trace_id(&self) -> Option<TraceId> {
        self.trace_id
    }
}
