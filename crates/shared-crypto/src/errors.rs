//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// Invalid signature format
    #[error("Invalid signature format")]
    InvalidSignatureFormat,

    /// Signature has a high S value
    #[error("Malleable signature (high S value)")]
    MalleableSignature,

    /// Recovery id is not 0, 1, 27 or 28
    #[error("Invalid recovery ID: {0}")]
    InvalidRecoveryId(u8),

    /// Public key recovery failed
    #[error("Failed to recover public key")]
    RecoveryFailed,

    /// Invalid private key
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Bytes do not encode a valid group element
    #[error("Invalid {0} encoding")]
    InvalidPoint(&'static str),

    /// Threshold aggregation input is inconsistent
    #[error("Cannot aggregate: {0}")]
    AggregationFailed(String),

    /// Invalid input for cryptographic operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
