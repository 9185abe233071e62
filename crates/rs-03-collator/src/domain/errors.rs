//! Collator error types.
//!
//! [`TxRejection`] is what a user sees on the result channel of a submitted
//! transaction. Everything else is internal and only logged or returned from
//! the service tasks.

use rs_01_p2p_schema::SchemaError;
use rs_02_p2p_messaging::MessagingError;
use shared_crypto::CryptoError;
use shared_types::{EpochId, TypesError, U256};
use thiserror::Error;

/// Why a user transaction was not included.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TxRejection {
    #[error("can't decode transaction bytes: {0}")]
    Malformed(String),

    #[error("transaction has wrong chainid (want={expected}, have={actual})")]
    WrongChainId { expected: U256, actual: U256 },

    #[error("only encrypted shutter transactions allowed")]
    WrongTxType,

    #[error("invalid transaction signature: {0}")]
    InvalidSignature(String),

    #[error("historic batch index {batch_index} (next batch is {next})")]
    BatchIndexInPast { batch_index: u64, next: u64 },

    #[error("batch too far in the future (batch index {batch_index}, next batch is {next})")]
    BatchIndexTooFarInFuture { batch_index: u64, next: u64 },

    #[error("account not initialized")]
    AccountNotInitialized,

    #[error("nonce mismatch (want={expected}, have={actual})")]
    NonceMismatch { expected: u64, actual: u64 },

    #[error("{0}")]
    InvalidGasParams(String),

    #[error("not enough funds to pay gas fee (balance={balance}, cost={cost})")]
    CannotPayGasFee { balance: U256, cost: U256 },

    #[error("gas limit reached ({used} + {gas} > {limit})")]
    GasLimitReached { used: u64, gas: u64, limit: u64 },

    #[error("batch size limit reached ({used} + {size} > {limit})")]
    BatchSizeLimitReached {
        used: usize,
        size: usize,
        limit: usize,
    },

    #[error("the batch this transaction is signed for has already been committed")]
    BatchAlreadyCommitted,

    #[error("transaction could not be applied: {0}")]
    NotApplied(Box<TxRejection>),

    #[error("no batch found for epoch {0}")]
    NoBatch(EpochId),

    #[error("duplicate transaction")]
    Duplicate,

    #[error("collator unavailable: {0}")]
    Unavailable(String),
}

impl TxRejection {
    /// Label used for the `outcome` metric.
    pub fn metric_label(&self) -> &'static str {
        match self {
            TxRejection::Malformed(_) | TxRejection::WrongTxType => "malformed",
            TxRejection::WrongChainId { .. } | TxRejection::InvalidSignature(_) => "invalid",
            TxRejection::BatchIndexInPast { .. }
            | TxRejection::BatchIndexTooFarInFuture { .. }
            | TxRejection::NoBatch(_) => "out_of_window",
            TxRejection::BatchAlreadyCommitted => "late",
            TxRejection::NotApplied(inner) => inner.metric_label(),
            TxRejection::Duplicate => "duplicate",
            TxRejection::Unavailable(_) => "unavailable",
            _ => "not_applicable",
        }
    }
}

/// Sequencer (L2) and L1 node RPC errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SequencerError {
    #[error("rpc call {method} failed: {reason}")]
    Rpc { method: &'static str, reason: String },

    #[error("invalid {method} response: {reason}")]
    InvalidResponse { method: &'static str, reason: String },

    #[error("batch transaction rejected: {0}")]
    Rejected(String),

    #[error("receipt for {0} not available yet")]
    ReceiptPending(String),
}

impl SequencerError {
    /// Transient errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SequencerError::Rpc { .. } | SequencerError::ReceiptPending(_)
        )
    }
}

/// Collator store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0} already exists")]
    Duplicate(String),
}

/// Errors of the collator services.
#[derive(Debug, Error)]
pub enum CollatorError {
    #[error("no eon public key for L1 block {0}")]
    NoEonPublicKey(u64),

    #[error("batch {0} already exists")]
    BatchAlreadyExists(EpochId),

    #[error("no batch for epoch {0}")]
    NoBatch(EpochId),

    #[error("sequencer is behind: batch index {sequencer}, collator at {collator}")]
    WaitForSequencer { sequencer: u64, collator: u64 },

    #[error("inconsistent state: {0}")]
    Inconsistent(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Sequencer(#[from] SequencerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Types(#[from] TypesError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Transaction codec errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty transaction")]
    Empty,

    #[error("unexpected transaction type {0:#04x}")]
    UnexpectedType(u8),

    #[error("rlp: {0}")]
    Rlp(String),

    #[error("transaction is not signed")]
    Unsigned,

    #[error("{field} does not fit {bits} bits")]
    Overflow { field: &'static str, bits: u32 },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<rlp::DecoderError> for CodecError {
    fn from(e: rlp::DecoderError) -> Self {
        CodecError::Rlp(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_phrases() {
        let wrong_chain = TxRejection::WrongChainId {
            expected: U256::from(1),
            actual: U256::from(2),
        };
        assert!(wrong_chain.to_string().contains("transaction has wrong chainid"));
        assert!(TxRejection::BatchIndexInPast { batch_index: 0, next: 2 }
            .to_string()
            .contains("historic batch index"));
        assert!(TxRejection::BatchIndexTooFarInFuture { batch_index: 7, next: 1 }
            .to_string()
            .contains("batch too far in the future"));
        assert!(TxRejection::GasLimitReached {
            used: 189000,
            gas: 21001,
            limit: 210000
        }
        .to_string()
        .contains("gas limit reached"));
    }

    #[test]
    fn test_not_applied_wraps_cause() {
        let err = TxRejection::NotApplied(Box::new(TxRejection::NonceMismatch {
            expected: 1,
            actual: 0,
        }));
        assert_eq!(
            err.to_string(),
            "transaction could not be applied: nonce mismatch (want=1, have=0)"
        );
        assert_eq!(err.metric_label(), "not_applicable");
    }

    #[test]
    fn test_transient_sequencer_errors() {
        assert!(SequencerError::Rpc {
            method: "eth_chainId",
            reason: "timeout".into()
        }
        .is_transient());
        assert!(!SequencerError::Rejected("bad batch".into()).is_transient());
    }
}
