//! Outbound (Driven) ports for the collator.
//!
//! - [`Sequencer`]: the rollup node the batch is executed on
//! - [`L1BlockSource`]: current L1 block number
//! - [`CollatorStore`]: persisted batches, transactions, triggers and eon keys
//! - [`TimeSource`]: wall clock for batch timestamps

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{Address, EpochId, Hash, U256};

use crate::domain::{BlockContext, SequencerError, StoreError, TxStatus};

// =============================================================================
// SEQUENCER
// =============================================================================

/// Receipt of an executed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: Hash,
    pub block_number: u64,
    /// `true` if execution succeeded.
    pub status: bool,
}

/// Minimal sequencer surface the collator consumes.
#[async_trait]
pub trait Sequencer: Send + Sync {
    async fn chain_id(&self) -> Result<U256, SequencerError>;

    /// Context of the latest sequencer block.
    async fn latest_block(&self) -> Result<BlockContext, SequencerError>;

    async fn balance(&self, address: Address) -> Result<U256, SequencerError>;

    async fn nonce(&self, address: Address) -> Result<u64, SequencerError>;

    /// Index of the last batch the sequencer executed.
    async fn batch_index(&self) -> Result<u64, SequencerError>;

    /// Submit a signed batch transaction. Returns its hash.
    async fn submit_batch(&self, raw: Vec<u8>) -> Result<Hash, SequencerError>;

    /// `None` while the transaction is not yet included.
    async fn transaction_receipt(
        &self,
        tx_hash: Hash,
    ) -> Result<Option<TransactionReceipt>, SequencerError>;
}

/// Current L1 block number.
#[async_trait]
pub trait L1BlockSource: Send + Sync {
    async fn block_number(&self) -> Result<u64, SequencerError>;
}

// =============================================================================
// STORE
// =============================================================================

/// Pointer to the next unclosed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextBatch {
    pub epoch_id: EpochId,
    pub l1_block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTransaction {
    pub tx_hash: Hash,
    pub epoch_id: EpochId,
    pub tx_bytes: Vec<u8>,
    pub status: TxStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRecord {
    pub id: u64,
    pub epoch_id: EpochId,
    pub batch_hash: Hash,
    pub l1_block_number: u64,
    pub sent: bool,
}

/// Input of [`CollatorStore::close_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseBatch {
    pub epoch_id: EpochId,
    pub batch_hash: Hash,
    pub l1_block_number: u64,
    /// Where the store moves the next-batch pointer to.
    pub next: NextBatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTxRecord {
    pub epoch_id: EpochId,
    pub marshalled: Vec<u8>,
    pub submitted: bool,
}

/// An eon public key as announced by the keypers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EonPublicKeyCandidate {
    pub hash: Hash,
    pub eon_public_key: Vec<u8>,
    pub activation_block: u64,
    pub keyper_config_index: u64,
    pub eon: u64,
    pub confirmed: bool,
}

/// Persistence of the collator.
///
/// Every method is atomic. `close_batch` additionally serialises with
/// `insert_transaction`, so no transaction lands in a batch after it closed.
pub trait CollatorStore: Send + Sync {
    fn next_batch(&self) -> Option<NextBatch>;

    /// Initialise the next-batch pointer. Fails if it is already set.
    fn init_next_batch(&self, next: NextBatch) -> Result<(), StoreError>;

    /// Insert with status `new`. Fails for a duplicate hash or an epoch
    /// before the next batch.
    fn insert_transaction(&self, tx: StoredTransaction) -> Result<(), StoreError>;

    fn transaction(&self, tx_hash: &Hash) -> Option<StoredTransaction>;

    fn set_transaction_status(&self, tx_hash: &Hash, status: TxStatus) -> Result<(), StoreError>;

    /// Non-rejected transactions of the open batches, in insertion order.
    fn recoverable_transactions(&self) -> Vec<StoredTransaction>;

    /// Close the current next batch: reject its `new` transactions, insert
    /// the trigger row and advance the pointer. Returns the rejected hashes.
    fn close_batch(&self, close: CloseBatch) -> Result<Vec<Hash>, StoreError>;

    /// Unsent triggers in insertion order.
    fn unsent_triggers(&self) -> Vec<TriggerRecord>;

    fn mark_trigger_sent(&self, id: u64) -> Result<(), StoreError>;

    /// Fails while another batch transaction is unsubmitted.
    fn insert_batch_tx(&self, record: BatchTxRecord) -> Result<(), StoreError>;

    fn unsubmitted_batch_tx(&self) -> Option<BatchTxRecord>;

    fn mark_batch_tx_submitted(&self, epoch_id: &EpochId) -> Result<(), StoreError>;

    /// Record `voter`'s vote for `candidate`. Confirms the candidate once
    /// `threshold` distinct keypers voted; returns `true` on that vote.
    fn vote_eon_public_key(
        &self,
        candidate: EonPublicKeyCandidate,
        voter: Address,
        threshold: u64,
    ) -> Result<bool, StoreError>;

    /// Confirmed key of `eon`.
    fn confirmed_eon_public_key(&self, eon: u64) -> Option<EonPublicKeyCandidate>;

    /// Confirmed key with the largest activation block ≤ `block`.
    fn confirmed_eon_public_key_for_block(&self, block: u64) -> Option<EonPublicKeyCandidate>;
}

// =============================================================================
// TIME
// =============================================================================

/// Wall clock, abstracted for deterministic tests.
pub trait TimeSource: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}
