//! # Error Types
//!
//! Conversion errors for the shared primitive types.

use thiserror::Error;

/// Errors produced while converting to or from shared types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypesError {
    /// Byte slice has the wrong length.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Value does not fit into the requested integer type.
    #[error("epoch id {0} does not fit into {1}")]
    Overflow(String, &'static str),

    /// Malformed hex input.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}
