//! # Envelope Codec
//!
//! Every gossip payload is a length-prefixed, bincode-encoded envelope:
//!
//! ```text
//! ┌──────────────┬────────────────────────────────────────────────┐
//! │ u32be length │ Envelope { version, message: Any, trace? }     │
//! └──────────────┴────────────────────────────────────────────────┘
//!                  Any { type_url, value = bincode(message) }
//! ```
//!
//! The inner message is encoded separately from the envelope, so an
//! envelope can be inspected (version, type) before the body is parsed.
//! `version` must equal [`ENVELOPE_VERSION`] exactly.

use serde::{Deserialize, Serialize};
use shutter_telemetry::{PropagatedContext, TracingHandle};

use crate::domain::errors::SchemaError;
use crate::domain::messages::P2PMessage;
use crate::domain::topics::Topic;

/// Envelope version spoken by this node.
pub const ENVELOPE_VERSION: &str = "0.0.1";

/// Largest accepted frame.
pub const MAX_MESSAGE_SIZE: usize = 1 << 20;

const LENGTH_PREFIX: usize = 4;

/// Type-tagged message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Any {
    pub type_url: String,
    pub value: Vec<u8>,
}

/// W3C trace context carried in an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
    pub trace_flags: u8,
    pub trace_state: String,
}

impl TraceContext {
    /// `None` for an empty or unparsable context.
    pub fn from_propagated(ctx: &PropagatedContext) -> Option<Self> {
        if !ctx.is_valid() {
            return None;
        }
        let mut trace_id = [0u8; 16];
        let mut span_id = [0u8; 8];
        hex::decode_to_slice(&ctx.trace_id, &mut trace_id).ok()?;
        hex::decode_to_slice(&ctx.span_id, &mut span_id).ok()?;
        Some(Self {
            trace_id,
            span_id,
            trace_flags: ctx.trace_flags,
            trace_state: ctx.trace_state.clone().unwrap_or_default(),
        })
    }

    pub fn to_propagated(&self) -> PropagatedContext {
        PropagatedContext {
            trace_id: hex::encode(self.trace_id),
            span_id: hex::encode(self.span_id),
            trace_flags: self.trace_flags,
            trace_state: (!self.trace_state.is_empty()).then(|| self.trace_state.clone()),
        }
    }
}

/// Versioned wrapper around one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: String,
    pub message: Any,
    pub trace: Option<TraceContext>,
}

/// A decoded message plus the trace context it arrived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub message: P2PMessage,
    pub trace: Option<TraceContext>,
}

/// Encode `message` into a framed envelope.
pub fn marshal(message: &P2PMessage, trace: Option<TraceContext>) -> Result<Vec<u8>, SchemaError> {
    let envelope = Envelope {
        version: ENVELOPE_VERSION.to_string(),
        message: Any {
            type_url: message.topic().type_url().to_string(),
            value: message.encode_value()?,
        },
        trace,
    };
    let body = bincode::serialize(&envelope)?;
    if body.len() + LENGTH_PREFIX > MAX_MESSAGE_SIZE {
        return Err(SchemaError::Frame(format!(
            "message of {} bytes exceeds limit",
            body.len()
        )));
    }
    let len = u32::try_from(body.len())
        .map_err(|_| SchemaError::Frame("length overflows u32".to_string()))?;

    let mut out = Vec::with_capacity(LENGTH_PREFIX + body.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a framed envelope received on `topic`.
///
/// The trace context is kept only when `tracing` has propagation enabled.
pub fn unmarshal(topic: &str, data: &[u8], tracing: &TracingHandle) -> Result<Received, SchemaError> {
    let topic: Topic = topic.parse()?;

    if data.len() > MAX_MESSAGE_SIZE {
        return Err(SchemaError::Frame(format!(
            "frame of {} bytes exceeds limit",
            data.len()
        )));
    }
    let (prefix, body) = data
        .split_first_chunk::<LENGTH_PREFIX>()
        .ok_or_else(|| SchemaError::Frame("missing length prefix".to_string()))?;
    let len = u32::from_be_bytes(*prefix) as usize;
    if len != body.len() {
        return Err(SchemaError::Frame(format!(
            "length prefix {len} but {} bytes follow",
            body.len()
        )));
    }

    let envelope: Envelope = bincode::deserialize(body)?;
    if envelope.version != ENVELOPE_VERSION {
        return Err(SchemaError::VersionMismatch {
            expected: ENVELOPE_VERSION,
            actual: envelope.version,
        });
    }
    if envelope.message.type_url != topic.type_url() {
        return Err(SchemaError::TypeMismatch {
            topic: topic.to_string(),
            type_url: envelope.message.type_url,
        });
    }

    let message = P2PMessage::decode_value(topic, &envelope.message.value)?;
    message.validate()?;

    let trace = if tracing.is_enabled() {
        envelope.trace
    } else {
        None
    };
    Ok(Received { message, trace })
}
