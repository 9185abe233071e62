//! # Batch State Machine
//!
//! One [`Batch`] per in-flight epoch. Transitions are pure: the async batch
//! runner performs every sequencer or store round-trip before it hands an
//! event to [`Batch::handle`].
//!
//! ```text
//!            PreviousConfirmed      EpochTick        DecryptionKey     BatchConfirmation
//!  Initial ──────────────────► Pending ───────► Committed ──────► Decrypted ──────► Confirmed
//!     │                          │                  │                  │                │
//!     └──────────────────────────┴───── Stop ───────┴──────────────────┴────────────────┘
//!                                          │
//!                                          ▼
//!                                Stopping ──► Stopped
//! ```
//!
//! Every transition yields a [`StateChangeResult`]. The trigger and batch
//! transaction it carries are unsigned; the runner signs them on the way out.

use std::fmt;

use rs_01_p2p_schema::{DecryptionTrigger, Message, P2PMessage};
use shared_types::{EpochId, Hash, U256};
use tracing::{debug, warn};

use crate::domain::chain_state::ChainState;
use crate::domain::errors::TxRejection;
use crate::domain::pending::PendingTransaction;
use crate::domain::queue::TransactionQueue;
use crate::domain::transaction::BatchTx;

// =============================================================================
// STATES AND EVENTS
// =============================================================================

/// Persisted status of a user transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxStatus {
    New,
    Committed,
    Rejected,
}

/// Observable state of a batch. Ordered along the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateTag {
    Initial,
    Pending,
    Committed,
    Decrypted,
    Confirmed,
    Stopping,
    Stopped,
}

impl StateTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateTag::Initial => "initial",
            StateTag::Pending => "pending",
            StateTag::Committed => "committed",
            StateTag::Decrypted => "decrypted",
            StateTag::Confirmed => "confirmed",
            StateTag::Stopping => "stopping",
            StateTag::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StateTag::Stopping | StateTag::Stopped)
    }
}

impl fmt::Display for StateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
enum State {
    /// Transactions arriving before the batch opens are parked unvalidated.
    Initial { pool: Vec<PendingTransaction> },
    Pending,
    Committed,
    Decrypted,
    Confirmed,
    Stopped,
}

impl State {
    fn tag(&self) -> StateTag {
        match self {
            State::Initial { .. } => StateTag::Initial,
            State::Pending => StateTag::Pending,
            State::Committed => StateTag::Committed,
            State::Decrypted => StateTag::Decrypted,
            State::Confirmed => StateTag::Confirmed,
            State::Stopped => StateTag::Stopped,
        }
    }
}

/// Input to [`Batch::handle`].
#[derive(Debug)]
pub enum BatchEvent {
    /// The previous batch was confirmed (or there is none).
    PreviousConfirmed,
    EpochTick,
    DecryptionKey { key: Vec<u8>, timestamp: u64 },
    BatchConfirmation(EpochId),
    Transaction(PendingTransaction),
    Stop,
}

impl BatchEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BatchEvent::PreviousConfirmed => "previous-confirmed",
            BatchEvent::EpochTick => "epoch-tick",
            BatchEvent::DecryptionKey { .. } => "decryption-key",
            BatchEvent::BatchConfirmation(_) => "batch-confirmation",
            BatchEvent::Transaction(_) => "transaction",
            BatchEvent::Stop => "stop",
        }
    }
}

/// Record emitted on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChangeResult {
    pub epoch_id: EpochId,
    /// `None` for the record announcing the batch's creation.
    pub from: Option<StateTag>,
    pub to: StateTag,
    pub p2p_messages: Vec<P2PMessage>,
    pub sequencer_transactions: Vec<BatchTx>,
    pub errors: Vec<String>,
}

impl StateChangeResult {
    fn new(epoch_id: EpochId, from: Option<StateTag>, to: StateTag) -> Self {
        Self {
            epoch_id,
            from,
            to,
            p2p_messages: Vec::new(),
            sequencer_transactions: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// The decryption trigger emitted on commit, if any.
    pub fn trigger(&self) -> Option<DecryptionTrigger> {
        self.p2p_messages
            .iter()
            .cloned()
            .find_map(DecryptionTrigger::from_p2p)
    }
}

// =============================================================================
// BATCH
// =============================================================================

pub struct Batch {
    instance_id: u64,
    epoch_id: EpochId,
    batch_index: u64,
    l1_block_number: u64,
    chain_id: U256,
    chain_state: Option<ChainState>,
    queue: TransactionQueue,
    decryption_key: Option<Vec<u8>>,
    state: State,
    tx_outcomes: Vec<(Hash, TxStatus)>,
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("epoch_id", &self.epoch_id)
            .field("l1_block_number", &self.l1_block_number)
            .field("state", &self.state.tag())
            .field("queued", &self.queue.len())
            .finish()
    }
}

enum ApplyFailure {
    Rejected(TxRejection),
    Inconsistent(String),
}

impl Batch {
    /// A batch in `Initial`. Its L1 block and chain id are provisional until
    /// [`set_chain_state`](Self::set_chain_state) is called.
    pub fn new(instance_id: u64, batch_index: u64) -> Self {
        Self {
            instance_id,
            epoch_id: EpochId::from_u64(batch_index),
            batch_index,
            l1_block_number: 0,
            chain_id: U256::zero(),
            chain_state: None,
            queue: TransactionQueue::new(),
            decryption_key: None,
            state: State::Initial { pool: Vec::new() },
            tx_outcomes: Vec::new(),
        }
    }

    /// Creation record (`None` → `Initial`).
    pub fn start(&self) -> StateChangeResult {
        StateChangeResult::new(self.epoch_id, None, StateTag::Initial)
    }

    pub fn epoch_id(&self) -> EpochId {
        self.epoch_id
    }

    pub fn batch_index(&self) -> u64 {
        self.batch_index
    }

    pub fn l1_block_number(&self) -> u64 {
        self.l1_block_number
    }

    pub fn chain_id(&self) -> U256 {
        self.chain_id
    }

    pub fn state(&self) -> StateTag {
        self.state.tag()
    }

    pub fn chain_state(&self) -> Option<&ChainState> {
        self.chain_state.as_ref()
    }

    pub fn decryption_key(&self) -> Option<&[u8]> {
        self.decryption_key.as_deref()
    }

    pub fn queue(&self) -> &TransactionQueue {
        &self.queue
    }

    /// `hash()` of the committed-transaction queue.
    pub fn hash(&self) -> Hash {
        self.queue.hash()
    }

    /// Senders parked in the `Initial` pool.
    pub fn pooled_senders(&self) -> Vec<shared_types::Address> {
        match &self.state {
            State::Initial { pool } => pool.iter().map(|tx| tx.sender).collect(),
            _ => Vec::new(),
        }
    }

    /// Install the execution state loaded for this epoch.
    pub fn set_chain_state(&mut self, l1_block_number: u64, chain_state: ChainState) {
        self.l1_block_number = l1_block_number;
        self.chain_id = chain_state.chain_id();
        self.chain_state = Some(chain_state);
    }

    /// Status changes since the last call, for persistence.
    pub fn take_tx_outcomes(&mut self) -> Vec<(Hash, TxStatus)> {
        std::mem::take(&mut self.tx_outcomes)
    }

    /// Apply one event. Returns one record per transition taken, in order.
    pub fn handle(&mut self, event: BatchEvent) -> Vec<StateChangeResult> {
        let from = self.state.tag();
        debug!(epoch = %self.epoch_id, state = %from, event = event.name(), "batch event");

        match (from, event) {
            (StateTag::Stopped, BatchEvent::Transaction(tx)) => {
                self.reject_late(tx);
                Vec::new()
            }
            (StateTag::Stopped, _) => Vec::new(),
            (_, BatchEvent::Stop) => self.stop(Vec::new()),

            (StateTag::Initial, BatchEvent::Transaction(tx)) => {
                if let State::Initial { pool } = &mut self.state {
                    pool.push(tx);
                }
                Vec::new()
            }
            (StateTag::Initial, BatchEvent::PreviousConfirmed) => self.open(),

            (StateTag::Pending, BatchEvent::Transaction(tx)) => {
                let mut errors = Vec::new();
                if self.admit(tx, false, &mut errors) {
                    Vec::new()
                } else {
                    self.stop(errors)
                }
            }
            (StateTag::Pending, BatchEvent::EpochTick) => self.commit(),

            (StateTag::Committed, BatchEvent::DecryptionKey { key, timestamp }) => {
                self.decrypt(key, timestamp)
            }

            (StateTag::Decrypted, BatchEvent::BatchConfirmation(epoch)) if epoch == self.epoch_id => {
                self.confirm()
            }

            (_, BatchEvent::Transaction(tx)) => {
                self.reject_late(tx);
                Vec::new()
            }
            (state, event) => {
                debug!(epoch = %self.epoch_id, %state, event = event.name(), "event ignored");
                Vec::new()
            }
        }
    }

    fn transition(&mut self, to: State) -> StateChangeResult {
        let from = self.state.tag();
        let result = StateChangeResult::new(self.epoch_id, Some(from), to.tag());
        self.state = to;
        result
    }

    /// Initial → Pending, then drain the pool.
    fn open(&mut self) -> Vec<StateChangeResult> {
        let pool = match std::mem::replace(&mut self.state, State::Pending) {
            State::Initial { pool } => pool,
            other => {
                self.state = other;
                return Vec::new();
            }
        };
        let mut result = StateChangeResult::new(self.epoch_id, Some(StateTag::Initial), StateTag::Pending);

        let mut consistent = true;
        for tx in pool {
            if !consistent {
                self.tx_outcomes.push((tx.hash, TxStatus::Rejected));
                tx.resolve(Err(TxRejection::Unavailable("batch stopped".to_string())));
                continue;
            }
            consistent = self.admit(tx, true, &mut result.errors);
        }

        if consistent {
            vec![result]
        } else {
            let mut results = vec![result];
            results.extend(self.stop(Vec::new()));
            results
        }
    }

    /// Pending → Committed. Emits the (unsigned) decryption trigger.
    fn commit(&mut self) -> Vec<StateChangeResult> {
        let mut result = self.transition(State::Committed);
        result.p2p_messages.push(
            DecryptionTrigger {
                instance_id: self.instance_id,
                epoch_id: self.epoch_id,
                block_number: self.l1_block_number,
                transactions_hash: self.queue.hash(),
                signature: Vec::new(),
            }
            .into_p2p(),
        );
        // the next batch loads its own state from the sequencer
        self.chain_state = None;
        vec![result]
    }

    /// Committed → Decrypted. Emits the (unsigned) batch transaction.
    fn decrypt(&mut self, key: Vec<u8>, timestamp: u64) -> Vec<StateChangeResult> {
        debug!(epoch = %self.epoch_id, num_txs = self.queue.len(), "constructing batch transaction");
        let batch_tx = BatchTx {
            chain_id: self.chain_id,
            decryption_key: key.clone(),
            batch_index: self.batch_index,
            l1_block_number: self.l1_block_number,
            timestamp,
            transactions: self.queue.bytes(),
            signature: None,
        };
        self.decryption_key = Some(key);
        let mut result = self.transition(State::Decrypted);
        result.sequencer_transactions.push(batch_tx);
        vec![result]
    }

    /// Decrypted → Confirmed. Every committed transaction succeeded.
    fn confirm(&mut self) -> Vec<StateChangeResult> {
        for tx in self.queue.drain() {
            tx.resolve(Ok(()));
        }
        vec![self.transition(State::Confirmed)]
    }

    /// any → Stopping → Stopped. Outstanding transactions fail.
    fn stop(&mut self, errors: Vec<String>) -> Vec<StateChangeResult> {
        let from = self.state.tag();
        let outstanding = match std::mem::replace(&mut self.state, State::Stopped) {
            State::Initial { pool } => pool,
            _ => Vec::new(),
        };
        for tx in outstanding.into_iter().chain(self.queue.drain()) {
            self.tx_outcomes.push((tx.hash, TxStatus::Rejected));
            tx.resolve(Err(TxRejection::Unavailable("batch stopped".to_string())));
        }
        self.chain_state = None;

        let mut stopping = StateChangeResult::new(self.epoch_id, Some(from), StateTag::Stopping);
        stopping.errors = errors;
        let stopped =
            StateChangeResult::new(self.epoch_id, Some(StateTag::Stopping), StateTag::Stopped);
        vec![stopping, stopped]
    }

    fn reject_late(&mut self, tx: PendingTransaction) {
        self.tx_outcomes.push((tx.hash, TxStatus::Rejected));
        tx.resolve(Err(TxRejection::BatchAlreadyCommitted));
    }

    /// Apply in `Pending`. Returns `false` when the batch is inconsistent and
    /// must stop.
    fn admit(&mut self, tx: PendingTransaction, pooled: bool, errors: &mut Vec<String>) -> bool {
        match self.apply_tx(&tx) {
            Ok(()) => {
                if !tx.committed {
                    self.tx_outcomes.push((tx.hash, TxStatus::Committed));
                }
                self.queue.enqueue(tx);
                true
            }
            Err(ApplyFailure::Rejected(rejection)) if tx.committed => {
                let reason = format!(
                    "committed transaction 0x{} fails re-validation: {rejection}",
                    hex::encode(tx.hash)
                );
                warn!(epoch = %self.epoch_id, error = %reason, "inconsistent batch");
                errors.push(reason);
                self.tx_outcomes.push((tx.hash, TxStatus::Rejected));
                tx.resolve(Err(rejection));
                false
            }
            Err(ApplyFailure::Rejected(rejection)) => {
                debug!(epoch = %self.epoch_id, error = %rejection, "transaction not applied");
                self.tx_outcomes.push((tx.hash, TxStatus::Rejected));
                let rejection = if pooled {
                    TxRejection::NotApplied(Box::new(rejection))
                } else {
                    rejection
                };
                tx.resolve(Err(rejection));
                true
            }
            Err(ApplyFailure::Inconsistent(reason)) => {
                warn!(epoch = %self.epoch_id, error = %reason, "inconsistent batch");
                errors.push(reason);
                self.tx_outcomes.push((tx.hash, TxStatus::Rejected));
                tx.resolve(Err(TxRejection::Unavailable("batch stopped".to_string())));
                false
            }
        }
    }

    fn apply_tx(&self, tx: &PendingTransaction) -> Result<(), ApplyFailure> {
        let state = self.chain_state.as_ref().ok_or_else(|| {
            ApplyFailure::Inconsistent("pending batch without execution state".to_string())
        })?;
        state
            .can_apply(&tx.tx, &tx.sender, tx.size())
            .map_err(ApplyFailure::Rejected)?;
        state
            .apply(&tx.tx, &tx.sender, tx.size())
            .map_err(|e| ApplyFailure::Inconsistent(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain_state::BlockContext;
    use crate::domain::pending::TxResultReceiver;
    use crate::domain::transaction::ShutterTx;
    use shared_crypto::{hash_byte_list, Secp256k1KeyPair};
    use shared_types::Address;

    const INSTANCE_ID: u64 = 42;

    fn key() -> Secp256k1KeyPair {
        Secp256k1KeyPair::from_bytes([11u8; 32]).unwrap()
    }

    fn chain_state(balance: u64) -> ChainState {
        let state = ChainState::new(
            EpochId::from_u64(1),
            U256::from(1),
            BlockContext {
                number: 5,
                base_fee: U256::one(),
                gas_limit: 210000,
                coinbase: [0xcc; 20],
            },
        );
        state.initialize(key().address(), U256::from(balance), 0);
        state
    }

    fn tx(nonce: u64, gas: u64) -> (PendingTransaction, TxResultReceiver) {
        let signed = ShutterTx {
            chain_id: U256::from(1),
            nonce,
            gas_tip_cap: U256::one(),
            gas_fee_cap: U256::from(2),
            gas,
            encrypted_payload: vec![nonce as u8; 16],
            batch_index: 1,
            signature: None,
        }
        .sign(&key())
        .unwrap();
        let raw = signed.encode().unwrap();
        let sender: Address = key().address();
        PendingTransaction::from_parts(signed, raw, sender)
    }

    fn open_batch(balance: u64) -> Batch {
        let mut batch = Batch::new(INSTANCE_ID, 1);
        batch.set_chain_state(100, chain_state(balance));
        let results = batch.handle(BatchEvent::PreviousConfirmed);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].to, StateTag::Pending);
        batch
    }

    #[tokio::test]
    async fn test_normal_flow() {
        let mut batch = open_batch(210000);
        let (tx0, rx0) = tx(0, 21000);
        let (tx1, rx1) = tx(1, 21000);
        let hashes = [tx0.hash, tx1.hash];
        let raws = vec![tx0.raw.clone(), tx1.raw.clone()];
        assert!(batch.handle(BatchEvent::Transaction(tx0)).is_empty());
        assert!(batch.handle(BatchEvent::Transaction(tx1)).is_empty());
        assert_eq!(
            batch.take_tx_outcomes(),
            vec![(hashes[0], TxStatus::Committed), (hashes[1], TxStatus::Committed)]
        );

        let committed = batch.handle(BatchEvent::EpochTick);
        let trigger = committed[0].trigger().unwrap();
        assert_eq!(trigger.epoch_id, EpochId::from_u64(1));
        assert_eq!(trigger.block_number, 100);
        assert_eq!(trigger.instance_id, INSTANCE_ID);
        assert_eq!(trigger.transactions_hash, hash_byte_list(hashes));
        assert!(batch.chain_state().is_none());

        let decrypted = batch.handle(BatchEvent::DecryptionKey {
            key: b"key1".to_vec(),
            timestamp: 1_700_000_000,
        });
        let batch_tx = &decrypted[0].sequencer_transactions[0];
        assert_eq!(batch_tx.batch_index, 1);
        assert_eq!(batch_tx.transactions, raws);
        assert_eq!(batch_tx.decryption_key, b"key1".to_vec());

        let confirmed = batch.handle(BatchEvent::BatchConfirmation(EpochId::from_u64(1)));
        assert_eq!(confirmed[0].to, StateTag::Confirmed);
        assert_eq!(rx0.wait().await, Ok(()));
        assert_eq!(rx1.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn test_pooled_transactions_applied_on_open() {
        let mut batch = Batch::new(INSTANCE_ID, 1);
        let (good, good_rx) = tx(0, 21000);
        let (bad, bad_rx) = tx(5, 21000);
        batch.handle(BatchEvent::Transaction(good));
        batch.handle(BatchEvent::Transaction(bad));
        assert_eq!(batch.pooled_senders().len(), 2);
        // ticks before opening are ignored
        assert!(batch.handle(BatchEvent::EpochTick).is_empty());

        batch.set_chain_state(100, chain_state(210000));
        batch.handle(BatchEvent::PreviousConfirmed);
        assert_eq!(batch.queue().len(), 1);

        match bad_rx.wait().await {
            Err(TxRejection::NotApplied(inner)) => {
                assert!(matches!(*inner, TxRejection::NonceMismatch { .. }))
            }
            other => panic!("unexpected result {other:?}"),
        }
        batch.take_tx_outcomes();
        batch.handle(BatchEvent::Stop);
        assert!(matches!(good_rx.wait().await, Err(TxRejection::Unavailable(_))));
        assert_eq!(batch.take_tx_outcomes().len(), 1);
    }

    #[tokio::test]
    async fn test_gas_limit_reached() {
        let mut batch = open_batch(10_000_000);
        let (first, first_rx) = tx(0, 189000);
        let (second, second_rx) = tx(1, 21001);
        batch.handle(BatchEvent::Transaction(first));
        batch.handle(BatchEvent::Transaction(second));

        let err = second_rx.wait().await.unwrap_err();
        assert!(err.to_string().contains("gas limit reached"));
        assert_eq!(batch.queue().len(), 1);
        drop(first_rx);
    }

    #[tokio::test]
    async fn test_late_transaction_rejected() {
        let mut batch = open_batch(210000);
        batch.handle(BatchEvent::EpochTick);
        let (late, rx) = tx(0, 21000);
        batch.handle(BatchEvent::Transaction(late));
        let err = rx.wait().await.unwrap_err();
        assert_eq!(err, TxRejection::BatchAlreadyCommitted);
        assert!(err
            .to_string()
            .contains("the batch this transaction is signed for has already been committed"));
    }

    #[test]
    fn test_foreign_confirmation_ignored() {
        let mut batch = open_batch(210000);
        batch.handle(BatchEvent::EpochTick);
        batch.handle(BatchEvent::DecryptionKey {
            key: vec![1],
            timestamp: 0,
        });
        assert!(batch
            .handle(BatchEvent::BatchConfirmation(EpochId::from_u64(2)))
            .is_empty());
        assert_eq!(batch.state(), StateTag::Decrypted);
        // a second key does not rebuild the batch transaction
        assert!(batch
            .handle(BatchEvent::DecryptionKey {
                key: vec![2],
                timestamp: 0
            })
            .is_empty());
    }

    #[test]
    fn test_stop_emits_stopping_then_stopped() {
        let mut batch = open_batch(210000);
        let results = batch.handle(BatchEvent::Stop);
        let tags: Vec<_> = results.iter().map(|r| (r.from, r.to)).collect();
        assert_eq!(
            tags,
            vec![
                (Some(StateTag::Pending), StateTag::Stopping),
                (Some(StateTag::Stopping), StateTag::Stopped)
            ]
        );
        assert!(batch.handle(BatchEvent::Stop).is_empty());
        assert!(batch.handle(BatchEvent::EpochTick).is_empty());
    }

    #[tokio::test]
    async fn test_recovered_committed_tx_failing_recheck_stops_batch() {
        let mut batch = Batch::new(INSTANCE_ID, 1);
        let (mut recovered, rx) = tx(3, 21000);
        recovered.committed = true;
        batch.handle(BatchEvent::Transaction(recovered));
        batch.set_chain_state(100, chain_state(210000));

        let results = batch.handle(BatchEvent::PreviousConfirmed);
        let tags: Vec<_> = results.iter().map(|r| r.to).collect();
        assert_eq!(
            tags,
            vec![StateTag::Pending, StateTag::Stopping, StateTag::Stopped]
        );
        assert_eq!(results[0].errors.len(), 1);
        assert!(rx.wait().await.is_err());
    }

    #[test]
    fn test_to_states_strictly_increase() {
        let mut batch = Batch::new(INSTANCE_ID, 1);
        let mut seen = vec![batch.start().to];
        batch.set_chain_state(100, chain_state(210000));
        let events = vec![
            BatchEvent::EpochTick,
            BatchEvent::PreviousConfirmed,
            BatchEvent::PreviousConfirmed,
            BatchEvent::EpochTick,
            BatchEvent::EpochTick,
            BatchEvent::DecryptionKey { key: vec![7], timestamp: 1 },
            BatchEvent::BatchConfirmation(EpochId::from_u64(1)),
            BatchEvent::Stop,
            BatchEvent::Stop,
        ];
        for event in events {
            seen.extend(batch.handle(event).into_iter().map(|r| r.to));
        }
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
        assert_eq!(seen.last(), Some(&StateTag::Stopped));
    }
}
