//! Submits batch transactions to the sequencer and waits for their receipt.
//!
//! At most one batch transaction is unsubmitted at any time. The submitter
//! reports the outcome back to the batch handler, which confirms or stops
//! the batch.

use std::sync::Arc;
use std::time::Duration;

use shared_types::{retry_if, EpochId, RetryOptions};
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info, warn};

use crate::domain::{BatchTx, CollatorError, SequencerError};
use crate::ports::BatchTxRecord;
use crate::service::CollatorDependencies;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of submitting one batch transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The sequencer executed the batch.
    Confirmed(EpochId),
    Failed { epoch_id: EpochId, reason: String },
}

pub struct BatchSubmitter {
    deps: CollatorDependencies,
    notify: Arc<Notify>,
    outcomes: mpsc::UnboundedSender<SubmissionOutcome>,
    receipt_retry: RetryOptions,
}

impl BatchSubmitter {
    pub fn new(
        deps: CollatorDependencies,
        notify: Arc<Notify>,
        outcomes: mpsc::UnboundedSender<SubmissionOutcome>,
    ) -> Self {
        let receipt_retry = RetryOptions::default()
            .number_of_retries(30)
            .interval(Duration::from_millis(500))
            .exponential_backoff(1.5)
            .max_interval(Duration::from_secs(10));
        Self {
            deps,
            notify,
            outcomes,
            receipt_retry,
        }
    }

    pub fn with_receipt_retry(mut self, options: RetryOptions) -> Self {
        self.receipt_retry = options;
        self
    }

    /// Submit the unsubmitted batch transaction, if any. Returns its outcome.
    pub async fn submit_pending(&self) -> Result<Option<SubmissionOutcome>, CollatorError> {
        let Some(record) = self.deps.store.unsubmitted_batch_tx() else {
            return Ok(None);
        };
        let outcome = self.submit(&record).await?;
        self.deps.store.mark_batch_tx_submitted(&record.epoch_id)?;
        // the handler may be gone during shutdown
        let _ = self.outcomes.send(outcome.clone());
        Ok(Some(outcome))
    }

    async fn submit(&self, record: &BatchTxRecord) -> Result<SubmissionOutcome, CollatorError> {
        let epoch_id = record.epoch_id;
        let batch_index = BatchTx::decode(&record.marshalled)?.batch_index;
        let deps = &self.deps;

        let sequencer_index = retry_if(
            &deps.settings.rpc_retry,
            "shutter_batchIndex",
            || deps.sequencer.batch_index(),
            SequencerError::is_transient,
        )
        .await?;
        if sequencer_index >= batch_index {
            info!(
                epoch = %epoch_id,
                sequencer_index,
                "sequencer already executed batch"
            );
            return Ok(SubmissionOutcome::Confirmed(epoch_id));
        }

        let submitted = retry_if(
            &deps.settings.rpc_retry,
            "shutter_submitBatch",
            || deps.sequencer.submit_batch(record.marshalled.clone()),
            SequencerError::is_transient,
        )
        .await;
        let hash = match submitted {
            Ok(hash) => hash,
            Err(e) if e.is_transient() => return Err(e.into()),
            Err(e) => {
                warn!(epoch = %epoch_id, error = %e, "sequencer rejected batch transaction");
                return Ok(SubmissionOutcome::Failed {
                    epoch_id,
                    reason: e.to_string(),
                });
            }
        };
        debug!(epoch = %epoch_id, tx = %hex::encode(hash), "submitted batch transaction");

        let receipt = retry_if(
            &self.receipt_retry,
            "eth_getTransactionReceipt",
            || async move {
                deps.sequencer
                    .transaction_receipt(hash)
                    .await?
                    .ok_or_else(|| SequencerError::ReceiptPending(hex::encode(hash)))
            },
            SequencerError::is_transient,
        )
        .await?;

        if receipt.status {
            info!(
                epoch = %epoch_id,
                block = receipt.block_number,
                "batch transaction included"
            );
            Ok(SubmissionOutcome::Confirmed(epoch_id))
        } else {
            warn!(epoch = %epoch_id, block = receipt.block_number, "batch transaction failed");
            Ok(SubmissionOutcome::Failed {
                epoch_id,
                reason: "batch transaction reverted".to_string(),
            })
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if let Err(e) = self.submit_pending().await {
                warn!(error = %e, "batch submission failed, will retry");
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("batch submitter stopped");
    }
}
