//! Schema and codec errors.

use shared_crypto::CryptoError;
use thiserror::Error;

/// Errors from decoding, encoding or signing gossip messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Envelope version differs from ours.
    #[error("envelope version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Our version.
        expected: &'static str,
        /// Version found on the wire.
        actual: String,
    },

    /// Topic string is not one of ours.
    #[error("no message type for topic <{0}>")]
    UnknownTopic(String),

    /// Envelope carries a message type not registered for the topic.
    #[error("topic <{topic}> does not carry <{type_url}>")]
    TypeMismatch {
        /// Topic the message arrived on.
        topic: String,
        /// Type URL found in the envelope.
        type_url: String,
    },

    /// Length prefix missing or inconsistent.
    #[error("malformed frame: {0}")]
    Frame(String),

    /// Serialization failure.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Decoded message failed structural checks.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Signing or recovery failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<bincode::Error> for SchemaError {
    fn from(e: bincode::Error) -> Self {
        SchemaError::Encoding(e.to_string())
    }
}
