//! Task driving one [`Batch`].
//!
//! The runner owns the batch and its event receiver. It performs every
//! round-trip the pure state machine needs (loading execution state,
//! fetching accounts, closing the batch in the store, signing the batch
//! transaction) and publishes each [`StateChangeResult`] on the batch's
//! broadcast channel, where the successor batch and the handler listen.

use std::collections::HashSet;

use shared_types::{retry_if, Address, EpochId, Hash};
use shutter_telemetry::metrics::{COLLATOR_BATCHES, COLLATOR_TRANSACTIONS};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::domain::{
    next_execution_block, Batch, BatchEvent, ChainState, CollatorError, SequencerError,
    StateChangeResult, StateTag, TxRejection, TxStatus,
};
use crate::ports::{BatchTxRecord, CloseBatch, NextBatch};
use crate::service::{CollatorDependencies, Wakeups};

pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;
pub(crate) const RESULT_CHANNEL_CAPACITY: usize = 32;

/// What a batch listens to on its predecessor.
pub(crate) struct Predecessor {
    pub results: broadcast::Receiver<StateChangeResult>,
    pub state: watch::Receiver<StateTag>,
}

pub(crate) struct RunnerChannels {
    pub events: mpsc::Receiver<BatchEvent>,
    pub results: broadcast::Sender<StateChangeResult>,
    pub state: watch::Sender<StateTag>,
    pub lifecycle: mpsc::UnboundedSender<StateChangeResult>,
}

pub(crate) struct BatchRunner {
    batch: Batch,
    deps: CollatorDependencies,
    channels: RunnerChannels,
    predecessor: Option<Predecessor>,
    wakeups: Wakeups,
    shutdown: watch::Receiver<bool>,
    /// Attached to the `Stopping` record of an externally caused stop.
    stop_reason: Option<String>,
}

fn is_transient(error: &CollatorError) -> bool {
    match error {
        CollatorError::Sequencer(e) => e.is_transient(),
        CollatorError::WaitForSequencer { .. } => true,
        _ => false,
    }
}

async fn initialize_account(
    deps: &CollatorDependencies,
    state: &ChainState,
    address: Address,
) -> Result<(), CollatorError> {
    if state.is_initialized(&address) {
        return Ok(());
    }
    let balance = deps.sequencer.balance(address).await?;
    let nonce = deps.sequencer.nonce(address).await?;
    state.initialize(address, balance, nonce);
    Ok(())
}

/// Pull everything a batch needs to open from the sequencer.
async fn load_chain_state(
    deps: &CollatorDependencies,
    epoch_id: EpochId,
    senders: &[Address],
) -> Result<(NextBatch, ChainState), CollatorError> {
    let next = deps
        .store
        .next_batch()
        .ok_or_else(|| CollatorError::Inconsistent("next batch not initialised".to_string()))?;
    if next.epoch_id != epoch_id {
        return Err(CollatorError::Inconsistent(format!(
            "opening batch {epoch_id} but next batch is {}",
            next.epoch_id
        )));
    }

    let collator_index = epoch_id.to_u64()?;
    let sequencer_index = deps.sequencer.batch_index().await?;
    if sequencer_index.saturating_add(1) < collator_index {
        return Err(CollatorError::WaitForSequencer {
            sequencer: sequencer_index,
            collator: collator_index,
        });
    }

    let chain_id = deps.sequencer.chain_id().await?;
    let block = deps.sequencer.latest_block().await?;
    let state = ChainState::new(epoch_id, chain_id, block);
    for sender in senders {
        initialize_account(deps, &state, *sender).await?;
    }
    Ok((next, state))
}

async fn next_predecessor_change(
    predecessor: &mut Option<Predecessor>,
) -> Result<StateChangeResult, RecvError> {
    match predecessor {
        Some(p) => p.results.recv().await,
        None => std::future::pending().await,
    }
}

impl BatchRunner {
    pub(crate) fn new(
        batch: Batch,
        deps: CollatorDependencies,
        channels: RunnerChannels,
        predecessor: Option<Predecessor>,
        wakeups: Wakeups,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            batch,
            deps,
            channels,
            predecessor,
            wakeups,
            shutdown,
            stop_reason: None,
        }
    }

    pub(crate) async fn run(mut self) {
        self.emit(self.batch.start());

        let previous = self.predecessor.as_ref().map(|p| *p.state.borrow());
        match previous {
            None => self.open().await,
            Some(StateTag::Confirmed) => {
                self.predecessor = None;
                self.open().await;
            }
            Some(tag) if tag.is_terminal() => {
                self.stop(format!("previous batch is {tag}")).await;
            }
            Some(_) => {}
        }

        while self.batch.state() != StateTag::Stopped {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        self.stop("shutting down".to_string()).await;
                    }
                }
                change = next_predecessor_change(&mut self.predecessor) => {
                    self.on_predecessor_change(change).await;
                }
                event = self.channels.events.recv() => match event {
                    Some(event) => self.on_event(event).await,
                    None => self.stop("event channel closed".to_string()).await,
                },
            }
        }

        self.drain();
        debug!(epoch = %self.batch.epoch_id(), "batch task finished");
    }

    async fn on_predecessor_change(&mut self, change: Result<StateChangeResult, RecvError>) {
        match change {
            Ok(change) if change.to == StateTag::Confirmed => {
                self.predecessor = None;
                self.open().await;
            }
            Ok(change) if change.to.is_terminal() => {
                self.stop(format!("previous batch {} stopped", change.epoch_id))
                    .await;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(missed)) => {
                self.stop(format!(
                    "lagged {missed} state changes behind previous batch"
                ))
                .await;
            }
            Err(RecvError::Closed) => {
                let last = self.predecessor.take().map(|p| {
                    let tag = *p.state.borrow();
                    tag
                });
                if last == Some(StateTag::Confirmed) {
                    self.open().await;
                } else {
                    self.stop("previous batch went away".to_string()).await;
                }
            }
        }
    }

    /// Load execution state, then `PreviousConfirmed`.
    async fn open(&mut self) {
        if self.batch.state() != StateTag::Initial {
            return;
        }
        let senders: Vec<Address> = self
            .batch
            .pooled_senders()
            .into_iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let epoch_id = self.batch.epoch_id();
        let deps = &self.deps;
        let loaded = retry_if(
            &deps.settings.rpc_retry,
            "load chain state",
            || load_chain_state(deps, epoch_id, &senders),
            is_transient,
        )
        .await;

        match loaded {
            Ok((next, state)) => {
                debug!(
                    epoch = %epoch_id,
                    l1_block = next.l1_block_number,
                    base_fee = %state.base_fee(),
                    gas_limit = state.block_gas_limit(),
                    "loaded chain state"
                );
                self.batch.set_chain_state(next.l1_block_number, state);
                self.dispatch(BatchEvent::PreviousConfirmed).await;
            }
            Err(e) => {
                error!(epoch = %epoch_id, error = %e, "failed to load chain state");
                self.stop(format!("loading chain state: {e}")).await;
            }
        }
    }

    async fn stop(&mut self, reason: String) {
        if self.stop_reason.is_none() {
            self.stop_reason = Some(reason);
        }
        self.dispatch(BatchEvent::Stop).await;
    }

    async fn on_event(&mut self, event: BatchEvent) {
        match event {
            BatchEvent::EpochTick if self.batch.state() == StateTag::Pending => {
                let l1_block = self.batch.l1_block_number();
                if self
                    .deps
                    .store
                    .confirmed_eon_public_key_for_block(l1_block)
                    .is_none()
                {
                    warn!(
                        epoch = %self.batch.epoch_id(),
                        error = %CollatorError::NoEonPublicKey(l1_block),
                        "not closing batch"
                    );
                    return;
                }
                self.dispatch(BatchEvent::EpochTick).await;
            }
            BatchEvent::Transaction(tx) if self.batch.state() == StateTag::Pending => {
                if let Err(e) = self.ensure_account(tx.sender).await {
                    warn!(
                        epoch = %self.batch.epoch_id(),
                        sender = %hex::encode(tx.sender),
                        error = %e,
                        "failed to fetch sender account"
                    );
                    self.persist_status(tx.hash, TxStatus::Rejected);
                    tx.resolve(Err(TxRejection::Unavailable(e.to_string())));
                    return;
                }
                self.dispatch(BatchEvent::Transaction(tx)).await;
            }
            other => self.dispatch(other).await,
        }
    }

    async fn ensure_account(&self, sender: Address) -> Result<(), CollatorError> {
        let Some(state) = self.batch.chain_state() else {
            return Ok(());
        };
        let deps = &self.deps;
        retry_if(
            &deps.settings.rpc_retry,
            "fetch account",
            || initialize_account(deps, state, sender),
            is_transient,
        )
        .await
    }

    /// Feed `event` to the batch and act on every resulting transition.
    /// Follow-up events (stop after confirmation or failure) are handled
    /// in the same call.
    async fn dispatch(&mut self, event: BatchEvent) {
        let mut next = Some(event);
        while let Some(event) = next.take() {
            let results = self.batch.handle(event);
            self.persist_tx_outcomes();

            for mut result in results {
                match self.process(&result).await {
                    Ok(follow_up) => {
                        if follow_up.is_some() {
                            next = follow_up;
                        }
                    }
                    Err(e) => {
                        error!(epoch = %result.epoch_id, state = %result.to, error = %e, "batch failed");
                        result.errors.push(e.to_string());
                        next = Some(BatchEvent::Stop);
                    }
                }
                if result.to == StateTag::Stopping {
                    if let Some(reason) = self.stop_reason.take() {
                        result.errors.push(reason);
                    }
                }
                self.emit(result);
            }
        }
    }

    async fn process(
        &self,
        result: &StateChangeResult,
    ) -> Result<Option<BatchEvent>, CollatorError> {
        COLLATOR_BATCHES
            .with_label_values(&[result.to.as_str()])
            .inc();
        info!(
            epoch = %result.epoch_id,
            from = result.from.map(|s| s.as_str()).unwrap_or("none"),
            to = %result.to,
            errors = result.errors.len(),
            "batch state changed"
        );

        match result.to {
            StateTag::Committed => {
                self.close(result).await?;
                Ok(None)
            }
            StateTag::Decrypted => {
                self.store_batch_transactions(result)?;
                Ok(None)
            }
            StateTag::Confirmed => Ok(Some(BatchEvent::Stop)),
            _ => Ok(None),
        }
    }

    /// Persist the closed batch and its trigger, advance the next batch.
    async fn close(&self, result: &StateChangeResult) -> Result<(), CollatorError> {
        let trigger = result
            .trigger()
            .ok_or_else(|| CollatorError::Inconsistent("commit without trigger".to_string()))?;
        let deps = &self.deps;
        let l1_block = retry_if(
            &deps.settings.rpc_retry,
            "eth_blockNumber",
            || deps.l1.block_number(),
            SequencerError::is_transient,
        )
        .await?;

        let next_index = self
            .batch
            .batch_index()
            .checked_add(1)
            .ok_or_else(|| CollatorError::Inconsistent("batch index overflow".to_string()))?;
        let next = NextBatch {
            epoch_id: EpochId::from_u64(next_index),
            l1_block_number: next_execution_block(
                l1_block,
                self.batch.l1_block_number(),
                deps.settings.execution_block_delay,
            ),
        };
        let rejected = deps.store.close_batch(CloseBatch {
            epoch_id: trigger.epoch_id,
            batch_hash: trigger.transactions_hash,
            l1_block_number: trigger.block_number,
            next,
        })?;

        info!(
            epoch = %trigger.epoch_id,
            num_txs = self.batch.queue().len(),
            rejected = rejected.len(),
            next_l1_block = next.l1_block_number,
            "closed batch"
        );
        self.wakeups.triggers.notify_one();
        Ok(())
    }

    fn store_batch_transactions(&self, result: &StateChangeResult) -> Result<(), CollatorError> {
        for batch_tx in &result.sequencer_transactions {
            let marshalled = batch_tx.clone().sign(&self.deps.key)?.encode()?;
            self.deps.store.insert_batch_tx(BatchTxRecord {
                epoch_id: result.epoch_id,
                marshalled,
                submitted: false,
            })?;
        }
        self.wakeups.submitter.notify_one();
        Ok(())
    }

    fn persist_tx_outcomes(&mut self) {
        for (hash, status) in self.batch.take_tx_outcomes() {
            let label = match status {
                TxStatus::Committed => "committed",
                TxStatus::Rejected => "rejected",
                TxStatus::New => "new",
            };
            COLLATOR_TRANSACTIONS.with_label_values(&[label]).inc();
            self.persist_status(hash, status);
        }
    }

    fn persist_status(&self, hash: Hash, status: TxStatus) {
        if let Err(e) = self.deps.store.set_transaction_status(&hash, status) {
            warn!(tx = %hex::encode(hash), error = %e, "failed to persist transaction status");
        }
    }

    fn emit(&self, result: StateChangeResult) {
        self.channels.state.send_replace(result.to);
        // no subscribers is fine
        let _ = self.channels.results.send(result.clone());
        let _ = self.channels.lifecycle.send(result);
    }

    /// Reject whatever is still queued for the stopped batch.
    fn drain(&mut self) {
        self.channels.events.close();
        while let Ok(event) = self.channels.events.try_recv() {
            if let BatchEvent::Transaction(_) = event {
                self.batch.handle(event);
            }
        }
        self.persist_tx_outcomes();
    }
}
