//! Ambient dispatch context.
//!
//! An [`AmbientContext`] carries the trace id, the in-flight operation ids,
//! and an insertion-ordered item bag across every layer of a dispatch,
//! including nested dispatches issued from inside handlers. It is path-scoped:
//! the engine (or a caller, for manual scopes) binds it to the current task
//! with [`AmbientContext::scope`], and any code running inside that scope can
//! reach it through [`AmbientContext::current`] without parameter threading.
//!
//! Handles are cheap clones of one shared instance; every clone observes the
//! same trace id, operation stacks, and items. Unrelated concurrent dispatches
//! never share a context because each root dispatch opens its own scope.
//!
//! Manual scoping, for issuing several dispatches under one trace id:
//!
//! ```
//! use hermes_core::AmbientContext;
//!
//! # async fn run() {
//! let context = AmbientContext::new();
//! context
//!     .clone()
//!     .scope(async {
//!         // every dispatch issued here shares `context`
//!         assert!(AmbientContext::current().is_some());
//!     })
//!     .await;
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::ContextError;
use crate::ids::{OperationId, TraceId};
use crate::request::RequestKind;

tokio::task_local! {
    static CURRENT_CONTEXT: AmbientContext;
}

/// Supplies the distributed-trace id of the surrounding infrastructure, if
/// one is active when a context is created.
///
/// The engine consults this seam once per context creation. Telemetry
/// integrations implement it against their tracer; tests pin it to a fixed
/// value.
pub trait TraceIdSource: Send + Sync + 'static {
    /// The currently active external trace id, or `None` when the caller is
    /// not being traced.
    fn active_trace_id(&self) -> Option<TraceId>;
}

/// Activation state of an [`AmbientContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    /// Freshly created, never activated.
    Created,
    /// Currently active; the item bag is accessible.
    Active,
    /// Previously active; may be activated again.
    Inactive,
}

struct ContextInner {
    trace_id: Mutex<TraceId>,
    state: Mutex<ActivationState>,
    command_ids: Mutex<Vec<OperationId>>,
    query_ids: Mutex<Vec<OperationId>>,
    items: Mutex<IndexMap<String, Value>>,
}

/// The ambient carrier shared by every layer of a dispatch tree.
#[derive(Clone)]
pub struct AmbientContext {
    inner: Arc<ContextInner>,
}

impl AmbientContext {
    /// Creates a context with a freshly generated trace id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_trace_id(TraceId::new())
    }

    /// Creates a context with a fixed trace id.
    #[must_use]
    pub fn with_trace_id(trace_id: TraceId) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                trace_id: Mutex::new(trace_id),
                state: Mutex::new(ActivationState::Created),
                command_ids: Mutex::new(Vec::new()),
                query_ids: Mutex::new(Vec::new()),
                items: Mutex::new(IndexMap::new()),
            }),
        }
    }

    /// Creates a context, adopting the source's active trace id when one
    /// exists and generating a fresh one otherwise.
    #[must_use]
    pub fn from_source(source: &dyn TraceIdSource) -> Self {
        match source.active_trace_id() {
            Some(trace_id) => Self::with_trace_id(trace_id),
            None => Self::new(),
        }
    }

    /// The context bound to the current task scope, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        CURRENT_CONTEXT.try_with(Self::clone).ok()
    }

    /// Runs `future` with this context bound as the current one.
    ///
    /// The binding covers every await point of `future`, including tasks
    /// it drives inline; it is released when the future completes.
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        CURRENT_CONTEXT.scope(self, future).await
    }

    /// Returns true when `other` is a handle to this same context instance.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The trace id shared by the whole dispatch tree.
    #[must_use]
    pub fn trace_id(&self) -> TraceId {
        *self.inner.trace_id.lock()
    }

    /// Replaces the trace id.
    ///
    /// Meaningful before the first dispatch in a manual scope; dispatches
    /// already in flight have logged the previous id.
    pub fn set_trace_id(&self, trace_id: TraceId) {
        *self.inner.trace_id.lock() = trace_id;
    }

    /// Current activation state.
    #[must_use]
    pub fn state(&self) -> ActivationState {
        *self.inner.state.lock()
    }

    /// Returns true while an [`ActivationGuard`] is alive.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == ActivationState::Active
    }

    /// Activates the context, making the item bag accessible until the
    /// returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::AlreadyActive`] if the context is already
    /// active. A context holds at most one activation at a time.
    pub fn activate(&self) -> Result<ActivationGuard, ContextError> {
        let mut state = self.inner.state.lock();
        if *state == ActivationState::Active {
            return Err(ContextError::AlreadyActive);
        }
        *state = ActivationState::Active;
        drop(state);
        Ok(ActivationGuard { inner: Arc::clone(&self.inner) })
    }

    /// The item bag of an active context.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::NotActive`] unless the context is currently
    /// active. The returned handle stays usable for as long as it is held.
    pub fn items(&self) -> Result<ItemBag, ContextError> {
        if !self.is_active() {
            return Err(ContextError::NotActive);
        }
        Ok(ItemBag { inner: Arc::clone(&self.inner) })
    }

    /// The id of the innermost in-flight command on this path, if any.
    #[must_use]
    pub fn command_id(&self) -> Option<OperationId> {
        self.inner.command_ids.lock().last().copied()
    }

    /// The id of the innermost in-flight query on this path, if any.
    #[must_use]
    pub fn query_id(&self) -> Option<OperationId> {
        self.inner.query_ids.lock().last().copied()
    }

    /// The id of the innermost in-flight operation of the given kind.
    #[must_use]
    pub fn operation_id(&self, kind: RequestKind) -> Option<OperationId> {
        match kind {
            RequestKind::Command => self.command_id(),
            RequestKind::Query => self.query_id(),
        }
    }

    /// Mints a fresh operation id for a dispatch of the given kind and
    /// pushes it; the returned guard pops it again when dropped, restoring
    /// whatever id the caller was under.
    ///
    /// Dispatch machinery calls this at every handler boundary. The guard
    /// also covers failure exits, since an unwound dispatch drops it.
    pub fn push_operation(&self, kind: RequestKind) -> OperationGuard {
        let id = OperationId::new();
        self.stack(kind).lock().push(id);
        OperationGuard { inner: Arc::clone(&self.inner), kind, id }
    }

    fn stack(&self, kind: RequestKind) -> &Mutex<Vec<OperationId>> {
        match kind {
            RequestKind::Command => &self.inner.command_ids,
            RequestKind::Query => &self.inner.query_ids,
        }
    }
}

impl Default for AmbientContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AmbientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmbientContext")
            .field("trace_id", &self.trace_id())
            .field("state", &self.state())
            .field("command_id", &self.command_id())
            .field("query_id", &self.query_id())
            .finish_non_exhaustive()
    }
}

/// Keeps an [`AmbientContext`] active; dropping it deactivates the context.
#[must_use = "dropping the guard deactivates the context"]
pub struct ActivationGuard {
    inner: Arc<ContextInner>,
}

impl ActivationGuard {
    /// The item bag, accessible without a state check while this guard is
    /// alive.
    #[must_use]
    pub fn items(&self) -> ItemBag {
        ItemBag { inner: Arc::clone(&self.inner) }
    }
}

impl Drop for ActivationGuard {
    fn drop(&mut self) {
        *self.inner.state.lock() = ActivationState::Inactive;
    }
}

impl std::fmt::Debug for ActivationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationGuard").finish_non_exhaustive()
    }
}

/// Marks one dispatch's operation id as in flight; dropping it restores the
/// caller's previous id.
#[must_use = "dropping the guard pops the operation id"]
pub struct OperationGuard {
    inner: Arc<ContextInner>,
    kind: RequestKind,
    id: OperationId,
}

impl OperationGuard {
    /// The operation id this guard pushed.
    #[must_use]
    pub const fn id(&self) -> OperationId {
        self.id
    }

    /// The request kind the id belongs to.
    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        self.kind
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let stack = match self.kind {
            RequestKind::Command => &self.inner.command_ids,
            RequestKind::Query => &self.inner.query_ids,
        };
        stack.lock().pop();
    }
}

impl std::fmt::Debug for OperationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationGuard")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Insertion-ordered key/value bag of an active context.
///
/// Acquired through [`AmbientContext::items`] or [`ActivationGuard::items`].
/// Values are [`serde_json::Value`], so anything a handler wants to stash for
/// a later middleware (or vice versa) must be representable as JSON.
#[derive(Clone)]
pub struct ItemBag {
    inner: Arc<ContextInner>,
}

impl ItemBag {
    /// Inserts a value, returning the previous value under the key if any.
    /// Re-inserting an existing key keeps its original position.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.inner.items.lock().insert(key.into(), value.into())
    }

    /// A clone of the value under `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.items.lock().get(key).cloned()
    }

    /// Removes the entry under `key`, preserving the order of the rest.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.items.lock().shift_remove(key)
    }

    /// All keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.items.lock().keys().cloned().collect()
    }

    /// A snapshot of all entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.inner
            .items
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    /// Returns true when the bag holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.lock().is_empty()
    }
}

impl std::fmt::Debug for ItemBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemBag")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
