//! Publishes decryption triggers in store insertion order.

use std::sync::Arc;
use std::time::Duration;

use rs_01_p2p_schema::{DecryptionTrigger, Message};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::domain::CollatorError;
use crate::service::CollatorDependencies;

/// Fallback poll interval when no wake-up arrives.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct TriggerSender {
    deps: CollatorDependencies,
    notify: Arc<Notify>,
}

impl TriggerSender {
    pub fn new(deps: CollatorDependencies, notify: Arc<Notify>) -> Self {
        Self { deps, notify }
    }

    /// Sign and publish every unsent trigger. Stops at the first failure so
    /// that later triggers are never published ahead of earlier ones.
    pub async fn send_pending(&self) -> Result<usize, CollatorError> {
        let mut sent = 0;
        for record in self.deps.store.unsent_triggers() {
            let trigger = DecryptionTrigger::new_signed(
                self.deps.settings.instance_id,
                record.epoch_id,
                record.l1_block_number,
                record.batch_hash,
                &self.deps.key,
            )?;
            self.deps.sender.send_message(trigger.into_p2p()).await?;
            self.deps.store.mark_trigger_sent(record.id)?;
            info!(
                epoch = %record.epoch_id,
                l1_block = record.l1_block_number,
                batch_hash = %hex::encode(record.batch_hash),
                "sent decryption trigger"
            );
            sent += 1;
        }
        Ok(sent)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if let Err(e) = self.send_pending().await {
                warn!(error = %e, "failed to send decryption triggers");
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
        debug!("trigger sender stopped");
    }
}
