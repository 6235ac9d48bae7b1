//! Trace-id source backed by the OpenTelemetry context.

use hermes_core::{TraceId, TraceIdSource};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;
use uuid::Uuid;

/// Reads the distributed-trace id from the active OpenTelemetry span.
///
/// Register it on the mediator builder and every root dispatch issued while
/// a sampled span is active joins that span's trace. When no span is active
/// (or its context is invalid) the source reports nothing and the engine
/// falls back to a fresh trace id.
///
/// An OpenTelemetry trace id is 16 bytes, the same width as the engine's
/// UUID-backed [`TraceId`], so the mapping is a byte-for-byte reinterpret.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtelTraceIdSource;

impl OtelTraceIdSource {
    /// Creates the source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TraceIdSource for OtelTraceIdSource {
    fn active_trace_id(&self) -> Option<TraceId> {
        let context = Context::current();
        let span = context.span();
        let span_context = span.span_context();
        if !span_context.is_valid() {
            return None;
        }
        let uuid = Uuid::from_bytes(span_context.trace_id().to_bytes());
        Some(TraceId::from_uuid(uuid))
    }
}
