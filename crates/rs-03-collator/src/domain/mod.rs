//! # Domain Layer
//!
//! Pure collator logic: the encrypted transaction codec, the execution-state
//! cache and the per-epoch batch state machine. Nothing in here performs I/O.

pub mod batch;
pub mod chain_state;
pub mod errors;
pub mod keyed_mutex;
pub mod pending;
pub mod queue;
pub mod transaction;

pub use batch::{Batch, BatchEvent, StateChangeResult, StateTag, TxStatus};
pub use chain_state::{
    gas_cost, next_execution_block, priority_fee, validate_gas_params, Account, BlockContext,
    ChainState, BATCH_SIZE_LIMIT, MINIMUM_TX_GAS,
};
pub use errors::{CodecError, CollatorError, SequencerError, StoreError, TxRejection};
pub use keyed_mutex::KeyedMutex;
pub use pending::{PendingTransaction, TxResult, TxResultReceiver};
pub use queue::TransactionQueue;
pub use transaction::{tx_hash, tx_type, BatchTx, ShutterTx, BATCH_TX_TYPE, SHUTTER_TX_TYPE};
