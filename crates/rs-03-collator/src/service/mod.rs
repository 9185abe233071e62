//! # Collator Services
//!
//! | Task             | Drives                                                    |
//! |------------------|-----------------------------------------------------------|
//! | `BatchHandler`   | admission window, batch pool, epoch ticker, recovery      |
//! | `batch_runner`   | one task per batch: I/O around the pure state machine     |
//! | `TriggerSender`  | signs and publishes closed batches in insertion order     |
//! | `BatchSubmitter` | submits the batch transaction and waits for its receipt   |
//! | `EonKeyHandler`  | validates and counts `EonPublicKey` votes                 |
//! | `KeysHandler`    | validates `DecryptionKeys` and forwards them to batches   |
//!
//! Tasks talk through `tokio` channels: an `mpsc` of [`BatchEvent`] into each
//! batch, a `broadcast` of [`StateChangeResult`] out of it, and `Notify`
//! wake-ups towards the trigger sender and the submitter.
//!
//! [`BatchEvent`]: crate::domain::BatchEvent
//! [`StateChangeResult`]: crate::domain::StateChangeResult

use std::sync::Arc;

use rs_02_p2p_messaging::MessageSender;
use shared_crypto::Secp256k1KeyPair;
use shared_types::{ChainObserver, RetryOptions};

use tokio::sync::Notify;

use crate::ports::{CollatorStore, L1BlockSource, Sequencer, TimeSource};

pub mod batch_handler;
pub(crate) mod batch_runner;
pub mod collator;
pub mod eon_handler;
pub mod keys_handler;
pub mod submitter;
pub mod trigger_sender;

pub use batch_handler::{BatchHandle, BatchHandler};
pub use collator::Collator;
pub use eon_handler::EonKeyHandler;
pub use keys_handler::KeysHandler;
pub use submitter::{BatchSubmitter, SubmissionOutcome};
pub use trigger_sender::TriggerSender;

/// Settings shared by the collator tasks.
#[derive(Debug, Clone)]
pub struct CollatorSettings {
    pub instance_id: u64,
    pub execution_block_delay: u64,
    pub batch_index_acceptance_interval: u64,
    pub epoch_duration: std::time::Duration,
    /// Retry policy for sequencer and L1 calls.
    pub rpc_retry: RetryOptions,
}

/// Ports and identity the collator tasks are built from.
#[derive(Clone)]
pub struct CollatorDependencies {
    pub settings: CollatorSettings,
    pub key: Arc<Secp256k1KeyPair>,
    pub sequencer: Arc<dyn Sequencer>,
    pub l1: Arc<dyn L1BlockSource>,
    pub store: Arc<dyn CollatorStore>,
    pub chain: Arc<dyn ChainObserver>,
    pub time: Arc<dyn TimeSource>,
    pub sender: Arc<dyn MessageSender>,
}

/// Wake-ups from the batch runners towards the background senders.
#[derive(Debug, Clone, Default)]
pub struct Wakeups {
    /// A batch closed and inserted a trigger row.
    pub triggers: Arc<Notify>,
    /// A batch transaction is ready for submission.
    pub submitter: Arc<Notify>,
}
