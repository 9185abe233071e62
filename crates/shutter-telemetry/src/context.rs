//! Trace context propagation across gossip messages.
//!
//! ## How It Works
//!
//! 1. The publisher asks its [`TracingHandle`] for the current context
//! 2. The context travels in the message envelope as a [`PropagatedContext`]
//! 3. The receiver opens its handling span as a child of that context
//!
//! Propagation is switched on per node by constructing an enabled
//! [`TracingHandle`]; a disabled handle never reads or attaches context.
//!
//! ```rust,ignore
//! let tracing = TracingHandle::enabled();
//! let trace = tracing.current();            // publisher side
//! let span = tracing.receive_span("decryptionKeys", trace.as_ref());
//! let _guard = span.enter();                // receiver side
//! ```

use opentelemetry::{
    trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
    Context,
};
use serde::{Deserialize, Serialize};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Trace context that can be serialized and sent across process boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagatedContext {
    /// Trace ID (32 hex characters)
    pub trace_id: String,
    /// Parent span ID (16 hex characters)
    pub span_id: String,
    /// Trace flags (sampled, etc.)
    pub trace_flags: u8,
    /// W3C trace state header value
    pub trace_state: Option<String>,
}

impl PropagatedContext {
    /// Create an empty context (no parent trace)
    pub fn empty() -> Self {
        Self {
            trace_id: "00000000000000000000000000000000".to_string(),
            span_id: "0000000000000000".to_string(),
            trace_flags: 0,
            trace_state: None,
        }
    }

    /// Check if this context is valid (has a real trace)
    pub fn is_valid(&self) -> bool {
        !self.trace_id.chars().all(|c| c == '0')
    }

    /// Parse into a remote OpenTelemetry span context.
    pub fn to_context(&self) -> RemoteContext {
        if !self.is_valid() {
            return RemoteContext::new();
        }

        let trace_id = TraceId::from_hex(&self.trace_id).unwrap_or(TraceId::INVALID);
        let span_id = SpanId::from_hex(&self.span_id).unwrap_or(SpanId::INVALID);
        let trace_flags = TraceFlags::new(self.trace_flags);
        let trace_state = self
            .trace_state
            .as_deref()
            .and_then(|s| s.parse::<TraceState>().ok())
            .unwrap_or_default();

        RemoteContext {
            span_context: Some(SpanContext::new(
                trace_id,
                span_id,
                trace_flags,
                true,
                trace_state,
            )),
        }
    }
}

/// OpenTelemetry span context of the peer that sent a message.
#[derive(Debug, Clone, Default)]
pub struct RemoteContext {
    span_context: Option<SpanContext>,
}

impl RemoteContext {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self { span_context: None }
    }

    /// Context of the current `tracing` span.
    pub fn extract_current() -> Self {
        let context = tracing::Span::current().context();
        let span_context = context.span().span_context().clone();

        Self {
            span_context: span_context.is_valid().then_some(span_context),
        }
    }

    /// Convert to a propagatable format for serialization.
    pub fn to_propagated(&self) -> PropagatedContext {
        match &self.span_context {
            Some(ctx) if ctx.is_valid() => {
                let state = ctx.trace_state().header();
                PropagatedContext {
                    trace_id: ctx.trace_id().to_string(),
                    span_id: ctx.span_id().to_string(),
                    trace_flags: ctx.trace_flags().to_u8(),
                    trace_state: (!state.is_empty()).then_some(state),
                }
            }
            _ => PropagatedContext::empty(),
        }
    }

    /// Check if this context has a valid trace.
    pub fn is_valid(&self) -> bool {
        self.span_context
            .as_ref()
            .map(|c| c.is_valid())
            .unwrap_or(false)
    }

    fn attach_to(&self, span: &tracing::Span) {
        if let Some(ctx) = &self.span_context {
            if ctx.is_valid() {
                span.set_parent(Context::new().with_remote_span_context(ctx.clone()));
            }
        }
    }
}

/// Injected trace-propagation switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TracingHandle {
    enabled: bool,
}

impl TracingHandle {
    /// Propagation on.
    pub fn enabled() -> Self {
        Self { enabled: true }
    }

    /// Propagation off.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    /// Whether envelopes carry trace context.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Context to attach to an outgoing message, if any.
    pub fn current(&self) -> Option<PropagatedContext> {
        if !self.enabled {
            return None;
        }
        let ctx = RemoteContext::extract_current();
        ctx.is_valid().then(|| ctx.to_propagated())
    }

    /// Span for handling a received message, parented to the sender's span
    /// when propagation is on.
    pub fn receive_span(&self, topic: &str, parent: Option<&PropagatedContext>) -> tracing::Span {
        let span = tracing::info_span!("p2p_receive", topic = %topic);
        if self.enabled {
            if let Some(parent) = parent {
                parent.to_context().attach_to(&span);
            }
        }
        span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context() {
        let ctx = PropagatedContext::empty();
        assert!(!ctx.is_valid());
        assert!(!ctx.to_context().is_valid());
    }

    #[test]
    fn test_context_roundtrip() {
        let propagated = PropagatedContext {
            trace_id: "0af7651916cd43dd8448eb211c80319c".to_string(),
            span_id: "b7ad6b7169203331".to_string(),
            trace_flags: 1,
            trace_state: Some("rs=1".to_string()),
        };

        let back = propagated.to_context().to_propagated();

        assert_eq!(propagated, back);
    }

    #[test]
    fn test_disabled_handle_yields_nothing() {
        let handle = TracingHandle::disabled();
        assert!(handle.current().is_none());
    }

    #[test]
    fn test_extract_current_without_subscriber() {
        let ctx = RemoteContext::extract_current();
        assert!(!ctx.is_valid());
        assert!(TracingHandle::enabled().current().is_none());
    }
}
