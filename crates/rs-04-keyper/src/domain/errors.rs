//! Keyper error types.

use rs_01_p2p_schema::SchemaError;
use rs_02_p2p_messaging::MessagingError;
use shared_crypto::CryptoError;
use shared_types::{IdentityPreimage, TypesError};
use thiserror::Error;

/// Keyper store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors of the keyper services.
#[derive(Debug, Error)]
pub enum KeyperError {
    #[error("no eon active at block {0}")]
    NoEonForBlock(u64),

    #[error("no DKG result for eon {0}")]
    NoDkgResult(u64),

    #[error("keyper index {index} out of range for {num_keypers} keypers")]
    KeyperIndexOutOfRange { index: u64, num_keypers: u64 },

    #[error("invalid DKG result: {0}")]
    InvalidDkgResult(String),

    #[error("failed to generate decryption key for {identity} from {shares} shares: {reason}")]
    Reconstruction {
        identity: IdentityPreimage,
        shares: usize,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Types(#[from] TypesError),
}
