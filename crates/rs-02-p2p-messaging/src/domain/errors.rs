//! Messaging layer errors.

use rs_01_p2p_schema::SchemaError;
use thiserror::Error;

use crate::domain::identity::PeerId;

/// Errors returned by handlers. Handlers in other crates use their own error
/// types; they are boxed at this seam.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// P2P configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {field}")]
    InvalidValue { field: &'static str, value: String },

    #[error("invalid bootstrap peer address {0:?}")]
    InvalidBootstrapAddress(String),

    #[error("invalid p2p key: {0}")]
    InvalidKey(String),

    #[error("no bootstrap peers configured")]
    NoBootstrapPeers,
}

/// Transport (mesh) errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer {0} unreachable")]
    Unreachable(PeerId),

    #[error("transport closed")]
    Closed,

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("transport setup failed: {0}")]
    Setup(String),
}

/// Errors surfaced by the messaging service.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not connect to any bootstrap node")]
    BootstrapUnreachable,

    #[error("no handler registered for topic {0}")]
    NoHandler(String),

    #[error("handler failed: {0}")]
    Handler(String),
}
