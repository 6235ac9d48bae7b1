//! Side-channel recorder for dispatch tests.
//!
//! Handlers, middlewares, and service factories under test hold a clone of an
//! [`Observations`] recorder and write what happened to them: ordered events,
//! the ids they observed, and which service instance they were given. The
//! test then asserts against the recorder instead of smuggling state out
//! through response types.

use std::sync::Arc;

use hermes_core::{OperationId, TraceId};
use parking_lot::Mutex;

/// Ids captured at one point during a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedIds {
    /// Trace id of the dispatch tree at the capture point.
    pub trace_id: TraceId,
    /// Innermost operation id visible at the capture point, if any.
    pub operation_id: Option<OperationId>,
}

#[derive(Default)]
struct Inner {
    events: Vec<String>,
    ids: Vec<RecordedIds>,
    instances: Vec<(&'static str, u64)>,
    next_instance: u64,
}

/// A shared recorder the pieces of a dispatch under test write to.
///
/// Clones share the same log, so the same recorder can be handed to a
/// handler, several middlewares, and the test body at once.
///
/// # Example
///
/// ```
/// use hermes_test::Observations;
///
/// let observations = Observations::new();
/// let in_handler = observations.clone();
///
/// in_handler.note("handler:start");
/// in_handler.note("handler:done");
///
/// assert_eq!(observations.events(), ["handler:start", "handler:done"]);
/// ```
#[derive(Clone, Default)]
pub struct Observations {
    inner: Arc<Mutex<Inner>>,
}

impl Observations {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one event to the ordered log.
    pub fn note(&self, event: impl Into<String>) {
        self.inner.lock().events.push(event.into());
    }

    /// The recorded events, in the order they were noted.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.inner.lock().events.clone()
    }

    /// Captures the ids visible at the caller's point in a dispatch.
    pub fn record_ids(&self, trace_id: TraceId, operation_id: Option<OperationId>) {
        self.inner.lock().ids.push(RecordedIds { trace_id, operation_id });
    }

    /// The recorded id captures, in order.
    #[must_use]
    pub fn ids(&self) -> Vec<RecordedIds> {
        self.inner.lock().ids.clone()
    }

    /// Hands out the next instance number.
    ///
    /// Service factories call this so every constructed instance carries a
    /// distinct number; lifetime tests then compare which numbers the
    /// resolved instances reported.
    pub fn next_instance(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.next_instance += 1;
        inner.next_instance
    }

    /// Records which instance of a labelled service did the work.
    pub fn record_instance(&self, label: &'static str, instance: u64) {
        self.inner.lock().instances.push((label, instance));
    }

    /// The instance numbers recorded under `label`, in order.
    #[must_use]
    pub fn instances(&self, label: &str) -> Vec<u64> {
        self.inner
            .lock()
            .instances
            .iter()
            .filter(|(recorded, _)| *recorded == label)
            .map(|(_, instance)| *instance)
            .collect()
    }
}

impl std::fmt::Debug for Observations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Observations")
            .field("events", &inner.events.len())
            .field("ids", &inner.ids.len())
            .field("instances", &inner.instances.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_keep_insertion_order() {
        let observations = Observations::new();
        observations.note("first");
        observations.note(String::from("second"));
        assert_eq!(observations.events(), ["first", "second"]);
    }

    #[test]
    fn test_clones_share_the_log() {
        let observations = Observations::new();
        let clone = observations.clone();
        clone.note("from clone");
        assert_eq!(observations.events(), ["from clone"]);
    }

    #[test]
    fn test_instance_numbers_are_distinct_and_filtered_by_label() {
        let observations = Observations::new();
        let first = observations.next_instance();
        let second = observations.next_instance();
        assert_ne!(first, second);

        observations.record_instance("repo", first);
        observations.record_instance("clock", second);
        observations.record_instance("repo", second);

        assert_eq!(observations.instances("repo"), [first, second]);
        assert_eq!(observations.instances("clock"), [second]);
    }

    #[test]
    fn test_record_ids_preserves_capture_order() {
        let observations = Observations::new();
        let trace_id = TraceId::new();
        let operation = OperationId::new();

        observations.record_ids(trace_id, Some(operation));
        observations.record_ids(trace_id, None);

        let ids = observations.ids();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], RecordedIds { trace_id, operation_id: Some(operation) });
        assert_eq!(ids[1].operation_id, None);
    }

    #[tokio::test]
    async fn test_notes_from_concurrent_tasks_all_land() {
        let observations = Observations::new();
        let mut handles = Vec::new();
        for worker in 0..8 {
            let observations = observations.clone();
            handles.push(tokio::spawn(async move {
                observations.note(format!("worker-{worker}"));
            }));
        }
        for handle in handles {
            handle.await.expect("worker should not panic");
        }
        assert_eq!(observations.events().len(), 8);
    }
}
