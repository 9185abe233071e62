//! # Batch Handler
//!
//! Owns the pool of live batches and the admission window.
//!
//! ```text
//!   next batch N                                  N + interval
//!        │                                             │
//!   ┌────▼────┐   ┌─────────┐         ┌─────────┐ ┌────▼────┐
//!   │ batch N │ ◄─┤ batch N+1│ ◄─ … ◄─┤         │ │  head   │
//!   └─────────┘   └─────────┘         └─────────┘ └─────────┘
//!        ▲  each batch listens to its predecessor's state changes
//! ```
//!
//! A transaction for batch `B` is admitted when `N <= B <= N + interval`.
//! It is persisted as `new` and handed to the batch task, which validates it
//! once the batch's execution state is known.
//!
//! When a batch commits, a new head batch is appended. When a batch stops it
//! leaves the pool; an empty pool is rebuilt from the store's next batch and
//! the recoverable transactions are fed back in.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{retry_if, EpochId, U256};
use shutter_telemetry::metrics::COLLATOR_TRANSACTIONS;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::SIZE_BATCH_POOL;
use crate::domain::{
    next_execution_block, tx_type, Batch, BatchEvent, CollatorError, PendingTransaction,
    SequencerError, ShutterTx, StateChangeResult, StateTag, StoreError, TxRejection,
    TxResultReceiver, TxStatus, SHUTTER_TX_TYPE,
};
use crate::ports::{CollatorApi, EonPublicKeyCandidate, NextBatch, StoredTransaction};
use crate::service::batch_runner::{
    BatchRunner, Predecessor, RunnerChannels, EVENT_CHANNEL_CAPACITY, RESULT_CHANNEL_CAPACITY,
};
use crate::service::submitter::SubmissionOutcome;
use crate::service::{CollatorDependencies, Wakeups};

/// Admission window check for a transaction encrypted for `batch_index`
/// while the next batch is `next`.
pub fn check_batch_window(batch_index: u64, next: u64, interval: u64) -> Result<(), TxRejection> {
    if batch_index < next {
        return Err(TxRejection::BatchIndexInPast { batch_index, next });
    }
    if batch_index > next.saturating_add(interval) {
        return Err(TxRejection::BatchIndexTooFarInFuture { batch_index, next });
    }
    Ok(())
}

/// A live batch task.
#[derive(Debug)]
pub struct BatchHandle {
    pub epoch_id: EpochId,
    pub batch_index: u64,
    events: mpsc::Sender<BatchEvent>,
    results: broadcast::Sender<StateChangeResult>,
    state: watch::Receiver<StateTag>,
    task: JoinHandle<()>,
}

impl BatchHandle {
    pub fn state(&self) -> StateTag {
        *self.state.borrow()
    }

    /// State changes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChangeResult> {
        self.results.subscribe()
    }

    pub(crate) fn predecessor(&self) -> Predecessor {
        Predecessor {
            results: self.results.subscribe(),
            state: self.state.clone(),
        }
    }
}

pub struct BatchHandler {
    deps: CollatorDependencies,
    chain_id: U256,
    pool: Mutex<BTreeMap<u64, BatchHandle>>,
    lifecycle_tx: mpsc::UnboundedSender<StateChangeResult>,
    lifecycle_rx: Mutex<Option<mpsc::UnboundedReceiver<StateChangeResult>>>,
    submissions_rx: Mutex<Option<mpsc::UnboundedReceiver<SubmissionOutcome>>>,
    wakeups: Wakeups,
    shutdown: watch::Receiver<bool>,
}

impl BatchHandler {
    /// Initialise the next batch pointer if needed, spawn the batch pool and
    /// recover persisted transactions.
    pub async fn new(
        deps: CollatorDependencies,
        wakeups: Wakeups,
        submissions: mpsc::UnboundedReceiver<SubmissionOutcome>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Arc<Self>, CollatorError> {
        let chain_id = retry_if(
            &deps.settings.rpc_retry,
            "eth_chainId",
            || deps.sequencer.chain_id(),
            SequencerError::is_transient,
        )
        .await?;

        if deps.store.next_batch().is_none() {
            let next = initial_batch(&deps).await?;
            deps.store.init_next_batch(next)?;
            info!(
                epoch = %next.epoch_id,
                l1_block = next.l1_block_number,
                "initialised next batch"
            );
        }

        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        let handler = Arc::new(Self {
            deps,
            chain_id,
            pool: Mutex::new(BTreeMap::new()),
            lifecycle_tx,
            lifecycle_rx: Mutex::new(Some(lifecycle_rx)),
            submissions_rx: Mutex::new(Some(submissions)),
            wakeups,
            shutdown,
        });
        handler.build_pool()?;
        handler.recover().await;
        Ok(handler)
    }

    pub fn chain_id(&self) -> U256 {
        self.chain_id
    }

    /// Drive the epoch ticker and react to batch lifecycle changes and
    /// submission outcomes. Returns once shut down and every batch stopped.
    pub async fn run(self: Arc<Self>) -> Result<(), CollatorError> {
        let mut lifecycle = self
            .lifecycle_rx
            .lock()
            .take()
            .ok_or_else(|| CollatorError::Inconsistent("batch handler already running".to_string()))?;
        let mut submissions = self
            .submissions_rx
            .lock()
            .take()
            .ok_or_else(|| CollatorError::Inconsistent("batch handler already running".to_string()))?;

        let period = self.deps.settings.epoch_duration;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = self.shutdown.clone();
        let mut shutting_down = *shutdown.borrow();

        info!(epoch_duration_ms = period.as_millis() as u64, "batch handler started");
        loop {
            if shutting_down {
                let mut pool = self.pool.lock();
                pool.retain(|_, handle| !handle.task.is_finished());
                if pool.is_empty() {
                    break;
                }
            }

            tokio::select! {
                changed = shutdown.changed(), if !shutting_down => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("batch handler shutting down");
                        shutting_down = true;
                    }
                }
                _ = ticker.tick() => {
                    if !shutting_down {
                        self.epoch_tick().await;
                    }
                }
                Some(result) = lifecycle.recv() => {
                    self.on_lifecycle(result, shutting_down).await;
                }
                Some(outcome) = submissions.recv() => {
                    self.on_submission(outcome).await;
                }
            }
        }

        let handles: Vec<BatchHandle> = std::mem::take(&mut *self.pool.lock())
            .into_values()
            .collect();
        for handle in handles {
            if let Err(e) = handle.task.await {
                warn!(epoch = %handle.epoch_id, error = %e, "batch task panicked");
            }
        }
        info!("batch handler stopped");
        Ok(())
    }

    // =========================================================================
    // ADMISSION
    // =========================================================================

    /// Admit a raw transaction. The receiver resolves once with the outcome.
    pub async fn enqueue_transaction(&self, raw: Vec<u8>) -> TxResultReceiver {
        match self.admit(raw).await {
            Ok(receiver) => {
                COLLATOR_TRANSACTIONS.with_label_values(&["accepted"]).inc();
                receiver
            }
            Err(rejection) => {
                debug!(error = %rejection, "transaction rejected");
                COLLATOR_TRANSACTIONS
                    .with_label_values(&[rejection.metric_label()])
                    .inc();
                TxResultReceiver::resolved(Err(rejection))
            }
        }
    }

    async fn admit(&self, raw: Vec<u8>) -> Result<TxResultReceiver, TxRejection> {
        let kind = tx_type(&raw).map_err(|e| TxRejection::Malformed(e.to_string()))?;
        if kind != SHUTTER_TX_TYPE {
            return Err(TxRejection::WrongTxType);
        }
        let tx = ShutterTx::decode(&raw).map_err(|e| TxRejection::Malformed(e.to_string()))?;
        if tx.chain_id != self.chain_id {
            return Err(TxRejection::WrongChainId {
                expected: self.chain_id,
                actual: tx.chain_id,
            });
        }
        let sender = tx
            .sender()
            .map_err(|e| TxRejection::InvalidSignature(e.to_string()))?;

        let next = self
            .deps
            .store
            .next_batch()
            .ok_or_else(|| TxRejection::Unavailable("next batch not initialised".to_string()))?;
        let next_index = next
            .epoch_id
            .to_u64()
            .map_err(|e| TxRejection::Unavailable(e.to_string()))?;
        let batch_index = tx.batch_index;
        check_batch_window(
            batch_index,
            next_index,
            self.deps.settings.batch_index_acceptance_interval,
        )?;
        let events = self
            .batch_sender(batch_index)
            .ok_or_else(|| TxRejection::NoBatch(EpochId::from_u64(batch_index)))?;

        let (pending, receiver) = PendingTransaction::from_parts(tx, raw, sender);
        let hash = pending.hash;
        self.deps
            .store
            .insert_transaction(StoredTransaction {
                tx_hash: hash,
                epoch_id: pending.epoch_id(),
                tx_bytes: pending.raw.clone(),
                status: TxStatus::New,
            })
            .map_err(|e| match e {
                StoreError::Conflict(_) => TxRejection::BatchIndexInPast {
                    batch_index,
                    next: next_index,
                },
                StoreError::Duplicate(_) => TxRejection::Duplicate,
                other => TxRejection::Unavailable(other.to_string()),
            })?;

        debug!(
            epoch = %pending.epoch_id(),
            tx = %hex::encode(hash),
            sender = %hex::encode(sender),
            nonce = pending.tx.nonce,
            "transaction admitted"
        );
        if events.send(BatchEvent::Transaction(pending)).await.is_err() {
            if let Err(e) = self.deps.store.set_transaction_status(&hash, TxStatus::Rejected) {
                warn!(tx = %hex::encode(hash), error = %e, "failed to persist transaction status");
            }
            return Err(TxRejection::Unavailable("batch stopped".to_string()));
        }
        Ok(receiver)
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Send an epoch tick to the batch at the store's next-batch pointer.
    pub async fn epoch_tick(&self) {
        let Some(next) = self.deps.store.next_batch() else {
            warn!("epoch tick without next batch");
            return;
        };
        debug!(epoch = %next.epoch_id, "epoch tick");
        if let Err(e) = self.send_event(next.epoch_id, BatchEvent::EpochTick).await {
            debug!(epoch = %next.epoch_id, error = %e, "epoch tick dropped");
        }
    }

    /// Forward a validated decryption key to its batch.
    pub async fn handle_decryption_key(
        &self,
        epoch_id: EpochId,
        key: Vec<u8>,
    ) -> Result<(), CollatorError> {
        let timestamp = self.deps.time.now();
        self.send_event(epoch_id, BatchEvent::DecryptionKey { key, timestamp })
            .await
    }

    /// The sequencer executed the batch transaction of `epoch_id`.
    pub async fn confirm_batch(&self, epoch_id: EpochId) -> Result<(), CollatorError> {
        self.send_event(epoch_id, BatchEvent::BatchConfirmation(epoch_id))
            .await
    }

    pub async fn stop_batch(&self, epoch_id: EpochId) -> Result<(), CollatorError> {
        self.send_event(epoch_id, BatchEvent::Stop).await
    }

    pub fn batch_state(&self, batch_index: u64) -> Option<StateTag> {
        self.pool.lock().get(&batch_index).map(BatchHandle::state)
    }

    pub fn pool_indices(&self) -> Vec<u64> {
        self.pool.lock().keys().copied().collect()
    }

    pub fn subscribe(&self, batch_index: u64) -> Option<broadcast::Receiver<StateChangeResult>> {
        self.pool.lock().get(&batch_index).map(BatchHandle::subscribe)
    }

    async fn send_event(&self, epoch_id: EpochId, event: BatchEvent) -> Result<(), CollatorError> {
        let index = epoch_id.to_u64()?;
        let events = self
            .batch_sender(index)
            .ok_or(CollatorError::NoBatch(epoch_id))?;
        events
            .send(event)
            .await
            .map_err(|_| CollatorError::NoBatch(epoch_id))
    }

    fn batch_sender(&self, batch_index: u64) -> Option<mpsc::Sender<BatchEvent>> {
        self.pool
            .lock()
            .get(&batch_index)
            .map(|handle| handle.events.clone())
    }

    async fn on_lifecycle(&self, result: StateChangeResult, shutting_down: bool) {
        match result.to {
            StateTag::Committed if !shutting_down => self.append_batch(),
            StateTag::Stopping if !result.errors.is_empty() => {
                warn!(epoch = %result.epoch_id, errors = ?result.errors, "batch stopping");
            }
            StateTag::Stopped => {
                let Ok(index) = result.epoch_id.to_u64() else {
                    return;
                };
                self.pool.lock().remove(&index);
                debug!(epoch = %result.epoch_id, "batch removed from pool");

                let empty = self.pool.lock().is_empty();
                if empty && !shutting_down {
                    self.rebuild().await;
                }
            }
            _ => {}
        }
    }

    async fn on_submission(&self, outcome: SubmissionOutcome) {
        let result = match outcome {
            SubmissionOutcome::Confirmed(epoch_id) => {
                info!(epoch = %epoch_id, "batch confirmed by sequencer");
                self.confirm_batch(epoch_id).await
            }
            SubmissionOutcome::Failed { epoch_id, reason } => {
                warn!(epoch = %epoch_id, %reason, "batch submission failed");
                self.stop_batch(epoch_id).await
            }
        };
        if let Err(e) = result {
            debug!(error = %e, "submission outcome not delivered");
        }
    }

    // =========================================================================
    // POOL
    // =========================================================================

    fn spawn_batch(&self, batch_index: u64, predecessor: Option<Predecessor>) -> BatchHandle {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (results_tx, _) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(StateTag::Initial);

        let batch = Batch::new(self.deps.settings.instance_id, batch_index);
        let epoch_id = batch.epoch_id();
        let runner = BatchRunner::new(
            batch,
            self.deps.clone(),
            RunnerChannels {
                events: events_rx,
                results: results_tx.clone(),
                state: state_tx,
                lifecycle: self.lifecycle_tx.clone(),
            },
            predecessor,
            self.wakeups.clone(),
            self.shutdown.clone(),
        );
        let task = tokio::spawn(runner.run().instrument(info_span!("batch", epoch = %epoch_id)));

        BatchHandle {
            epoch_id,
            batch_index,
            events: events_tx,
            results: results_tx,
            state: state_rx,
            task,
        }
    }

    /// Spawn the next batch and the admission window behind it.
    fn build_pool(&self) -> Result<(), CollatorError> {
        let next = self
            .deps
            .store
            .next_batch()
            .ok_or_else(|| CollatorError::Inconsistent("next batch not initialised".to_string()))?;
        let first = next.epoch_id.to_u64()?;
        let size = self
            .deps
            .settings
            .batch_index_acceptance_interval
            .min(SIZE_BATCH_POOL)
            + 1;

        let mut pool = self.pool.lock();
        let mut predecessor = None;
        for index in first..first.saturating_add(size) {
            if pool.contains_key(&index) {
                return Err(CollatorError::BatchAlreadyExists(EpochId::from_u64(index)));
            }
            let handle = self.spawn_batch(index, predecessor.take());
            predecessor = Some(handle.predecessor());
            pool.insert(index, handle);
        }
        info!(first, size, "batch pool started");
        Ok(())
    }

    fn append_batch(&self) {
        let mut pool = self.pool.lock();
        let (index, predecessor) = match pool.iter().next_back() {
            Some((last, handle)) => match last.checked_add(1) {
                Some(index) => (index, handle.predecessor()),
                None => return,
            },
            None => return,
        };
        let handle = self.spawn_batch(index, Some(predecessor));
        pool.insert(index, handle);
        debug!(epoch = %EpochId::from_u64(index), size = pool.len(), "appended head batch");
    }

    async fn rebuild(&self) {
        warn!("batch pool empty, rebuilding from the store");
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(self.deps.settings.rpc_retry.interval) => {}
            _ = shutdown.changed() => return,
        }
        if let Err(e) = self.build_pool() {
            error!(error = %e, "failed to rebuild batch pool");
            return;
        }
        self.recover().await;
    }

    /// Feed persisted, non-rejected transactions back into their batches.
    async fn recover(&self) {
        let stored = self.deps.store.recoverable_transactions();
        if stored.is_empty() {
            return;
        }
        info!(count = stored.len(), "recovering transactions");

        for record in stored {
            let tx = hex::encode(record.tx_hash);
            let (mut pending, _receiver) = match PendingTransaction::new(record.tx_bytes) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(%tx, error = %e, "dropping undecodable transaction");
                    self.reject_recovered(&record.tx_hash);
                    continue;
                }
            };
            pending.committed = record.status == TxStatus::Committed;

            let Some(events) = self.batch_sender(pending.tx.batch_index) else {
                warn!(%tx, epoch = %pending.epoch_id(), "no batch for recovered transaction");
                self.reject_recovered(&record.tx_hash);
                continue;
            };
            if events.send(BatchEvent::Transaction(pending)).await.is_err() {
                self.reject_recovered(&record.tx_hash);
            }
        }
    }

    fn reject_recovered(&self, hash: &shared_types::Hash) {
        if let Err(e) = self.deps.store.set_transaction_status(hash, TxStatus::Rejected) {
            warn!(tx = %hex::encode(hash), error = %e, "failed to persist transaction status");
        }
    }
}

/// Next batch for a fresh store: one past the sequencer's last batch.
async fn initial_batch(deps: &CollatorDependencies) -> Result<NextBatch, CollatorError> {
    let retry = &deps.settings.rpc_retry;
    let sequencer_index = retry_if(
        retry,
        "shutter_batchIndex",
        || deps.sequencer.batch_index(),
        SequencerError::is_transient,
    )
    .await?;
    let l1_block = retry_if(
        retry,
        "eth_blockNumber",
        || deps.l1.block_number(),
        SequencerError::is_transient,
    )
    .await?;
    let index = sequencer_index
        .checked_add(1)
        .ok_or_else(|| CollatorError::Inconsistent("sequencer batch index overflow".to_string()))?;
    Ok(NextBatch {
        epoch_id: EpochId::from_u64(index),
        l1_block_number: next_execution_block(l1_block, 0, deps.settings.execution_block_delay),
    })
}

#[async_trait]
impl CollatorApi for BatchHandler {
    async fn submit_transaction(&self, raw: Vec<u8>) -> TxResultReceiver {
        self.enqueue_transaction(raw).await
    }

    fn next_batch(&self) -> Option<NextBatch> {
        self.deps.store.next_batch()
    }

    fn eon_public_key(&self, block: u64) -> Option<EonPublicKeyCandidate> {
        self.deps.store.confirmed_eon_public_key_for_block(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{tx_hash, BatchTx};
    use crate::ports::CollatorStore;
    use crate::testing::{wait_until, Fixture, CHAIN_ID, TIMESTAMP};
    use proptest::prelude::*;
    use std::time::Duration;

    async fn handler(f: &Fixture) -> Arc<BatchHandler> {
        let (_tx, rx) = mpsc::unbounded_channel();
        BatchHandler::new(f.deps.clone(), f.wakeups.clone(), rx, f.shutdown_rx())
            .await
            .unwrap()
    }

    async fn wait_for_state(handler: &BatchHandler, index: u64, tag: StateTag) {
        wait_until(&format!("batch {index} in {tag}"), || {
            handler.batch_state(index) == Some(tag)
        })
        .await;
    }

    #[test]
    fn test_check_batch_window() {
        assert_eq!(
            check_batch_window(0, 2, 5),
            Err(TxRejection::BatchIndexInPast {
                batch_index: 0,
                next: 2
            })
        );
        assert!(check_batch_window(2, 2, 5).is_ok());
        assert!(check_batch_window(6, 1, 5).is_ok());
        assert_eq!(
            check_batch_window(7, 1, 5),
            Err(TxRejection::BatchIndexTooFarInFuture {
                batch_index: 7,
                next: 1
            })
        );
        assert!(check_batch_window(u64::MAX, u64::MAX - 1, 5).is_ok());
    }

    proptest! {
        #[test]
        fn prop_admitted_index_is_inside_window(
            next in 0u64..1_000_000,
            offset in -10i64..20,
            interval in 1u64..=5,
        ) {
            let batch_index = (next as i64 + offset).max(0) as u64;
            let admitted = check_batch_window(batch_index, next, interval).is_ok();
            prop_assert_eq!(admitted, next <= batch_index && batch_index <= next + interval);
        }
    }

    #[tokio::test]
    async fn test_new_initialises_next_batch_and_pool() {
        let f = Fixture::new();
        f.sequencer.set_batch_index(3);
        f.sequencer.set_l1_block_number(20);
        let handler = handler(&f).await;

        let next = f.store.next_batch().unwrap();
        assert_eq!(next.epoch_id, EpochId::from_u64(4));
        assert_eq!(next.l1_block_number, 15);
        assert_eq!(handler.pool_indices(), vec![4, 5, 6, 7, 8, 9]);
        assert_eq!(handler.chain_id(), U256::from(CHAIN_ID));
        wait_for_state(&handler, 4, StateTag::Pending).await;
        assert_eq!(handler.batch_state(5), Some(StateTag::Initial));
    }

    #[tokio::test]
    async fn test_rejects_malformed_and_foreign_transactions() {
        let f = Fixture::new();
        let handler = handler(&f).await;

        let rejection = handler.enqueue_transaction(vec![]).await.wait().await;
        assert!(matches!(rejection, Err(TxRejection::Malformed(_))));

        let mut wrong_type = f.tx(1, 0, 21000);
        wrong_type[0] = 0x02;
        let rejection = handler.enqueue_transaction(wrong_type).await.wait().await;
        assert_eq!(rejection, Err(TxRejection::WrongTxType));

        let foreign = ShutterTx {
            chain_id: U256::from(99),
            nonce: 0,
            gas_tip_cap: U256::from(1),
            gas_fee_cap: U256::from(2),
            gas: 21000,
            encrypted_payload: vec![1],
            batch_index: 1,
            signature: None,
        }
        .sign(&f.user)
        .unwrap()
        .encode()
        .unwrap();
        let rejection = handler.enqueue_transaction(foreign).await.wait().await.unwrap_err();
        assert!(rejection.to_string().contains("transaction has wrong chainid"));
        assert!(f.store.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_future_window_edges() {
        let f = Fixture::new();
        let handler = handler(&f).await;

        let mut edge = handler.enqueue_transaction(f.tx(6, 0, 21000)).await;
        assert!(edge.try_result().is_none());
        assert_eq!(f.store.transactions().len(), 1);

        let rejection = handler
            .enqueue_transaction(f.tx(7, 0, 21000))
            .await
            .wait()
            .await
            .unwrap_err();
        assert!(rejection.to_string().contains("batch too far in the future"));
        assert_eq!(f.store.transactions().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_transaction() {
        let f = Fixture::new();
        let handler = handler(&f).await;
        wait_for_state(&handler, 1, StateTag::Pending).await;

        let raw = f.tx(2, 0, 21000);
        let _first = handler.enqueue_transaction(raw.clone()).await;
        let second = handler.enqueue_transaction(raw).await.wait().await;
        assert_eq!(second, Err(TxRejection::Duplicate));
    }

    #[tokio::test]
    async fn test_full_batch_lifecycle() {
        let f = Fixture::new();
        f.confirm_eon_key(1, 0);
        let handler = handler(&f).await;
        tokio::spawn(Arc::clone(&handler).run());
        wait_for_state(&handler, 1, StateTag::Pending).await;

        let raw0 = f.tx(1, 0, 21000);
        let raw1 = f.tx(1, 1, 21000);
        let rx0 = handler.enqueue_transaction(raw0.clone()).await;
        let rx1 = handler.enqueue_transaction(raw1.clone()).await;
        wait_until("both transactions committed", || {
            f.store
                .transactions()
                .iter()
                .all(|tx| tx.status == TxStatus::Committed)
        })
        .await;

        handler.epoch_tick().await;
        wait_for_state(&handler, 1, StateTag::Committed).await;
        let trigger = f.store.triggers().pop().unwrap();
        assert_eq!(trigger.epoch_id, EpochId::from_u64(1));
        assert_eq!(
            trigger.batch_hash,
            shared_crypto::hash_byte_list([tx_hash(&raw0), tx_hash(&raw1)])
        );
        assert_eq!(f.store.next_batch().unwrap().epoch_id, EpochId::from_u64(2));
        wait_until("head batch appended", || handler.pool_indices().contains(&7)).await;

        handler
            .handle_decryption_key(EpochId::from_u64(1), b"key1".to_vec())
            .await
            .unwrap();
        wait_for_state(&handler, 1, StateTag::Decrypted).await;
        let record = f.store.unsubmitted_batch_tx().unwrap();
        let batch_tx = BatchTx::decode(&record.marshalled).unwrap();
        assert_eq!(batch_tx.batch_index, 1);
        assert_eq!(batch_tx.decryption_key, b"key1".to_vec());
        assert_eq!(batch_tx.timestamp, TIMESTAMP);
        assert_eq!(batch_tx.transactions, vec![raw0, raw1]);
        assert_eq!(batch_tx.sender().unwrap(), f.deps.key.address());

        handler.confirm_batch(EpochId::from_u64(1)).await.unwrap();
        assert_eq!(rx0.wait().await, Ok(()));
        assert_eq!(rx1.wait().await, Ok(()));
        wait_until("confirmed batch leaves the pool", || {
            !handler.pool_indices().contains(&1)
        })
        .await;
        wait_for_state(&handler, 2, StateTag::Pending).await;
        assert_eq!(f.store.triggers()[0].epoch_id, EpochId::from_u64(1));
        let _ = f.shutdown.send(true);
    }

    #[tokio::test]
    async fn test_historic_batch_after_commit() {
        let f = Fixture::new();
        f.confirm_eon_key(1, 0);
        let handler = handler(&f).await;
        wait_for_state(&handler, 1, StateTag::Pending).await;

        handler.epoch_tick().await;
        wait_for_state(&handler, 1, StateTag::Committed).await;

        let rejection = handler
            .enqueue_transaction(f.tx(0, 0, 21000))
            .await
            .wait()
            .await
            .unwrap_err();
        assert!(rejection.to_string().contains("historic batch index"));
        let rejection = handler
            .enqueue_transaction(f.tx(1, 0, 21000))
            .await
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(rejection, TxRejection::BatchIndexInPast { .. }));
        assert!(f.store.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_tick_without_eon_key_keeps_batch_pending() {
        let f = Fixture::new();
        let handler = handler(&f).await;
        wait_for_state(&handler, 1, StateTag::Pending).await;

        handler.epoch_tick().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handler.batch_state(1), Some(StateTag::Pending));
        assert!(f.store.triggers().is_empty());
    }

    #[tokio::test]
    async fn test_recovery_feeds_persisted_transactions() {
        let f = Fixture::new();
        f.store
            .init_next_batch(NextBatch {
                epoch_id: EpochId::from_u64(1),
                l1_block_number: 0,
            })
            .unwrap();
        let raw = f.tx(1, 0, 21000);
        let hash = tx_hash(&raw);
        f.store
            .insert_transaction(StoredTransaction {
                tx_hash: hash,
                epoch_id: EpochId::from_u64(1),
                tx_bytes: raw,
                status: TxStatus::New,
            })
            .unwrap();
        f.store
            .insert_transaction(StoredTransaction {
                tx_hash: [0xab; 32],
                epoch_id: EpochId::from_u64(1),
                tx_bytes: vec![0x50, 0xff],
                status: TxStatus::New,
            })
            .unwrap();

        let _handler = handler(&f).await;
        wait_until("recovered transaction committed", || {
            f.store.transaction(&hash).map(|tx| tx.status) == Some(TxStatus::Committed)
        })
        .await;
        assert_eq!(
            f.store.transaction(&[0xab; 32]).unwrap().status,
            TxStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_every_batch() {
        let f = Fixture::new();
        let handler = handler(&f).await;
        let task = tokio::spawn(Arc::clone(&handler).run());
        wait_for_state(&handler, 1, StateTag::Pending).await;
        let rx = handler.enqueue_transaction(f.tx(3, 0, 21000)).await;

        f.shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(handler.pool_indices().is_empty());
        assert!(matches!(rx.wait().await, Err(TxRejection::Unavailable(_))));
    }
}
