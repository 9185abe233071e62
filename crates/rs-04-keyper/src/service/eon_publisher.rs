//! Announces the public key of every eon with a successful DKG.

use std::sync::Arc;
use std::time::Duration;

use rs_01_p2p_schema::{EonPublicKey, Message};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::domain::KeyperError;
use crate::service::KeyperDependencies;

/// Retry interval for announcements that failed to publish.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct EonPublisher {
    deps: KeyperDependencies,
    notify: Arc<Notify>,
}

impl EonPublisher {
    pub fn new(deps: KeyperDependencies, notify: Arc<Notify>) -> Self {
        Self { deps, notify }
    }

    /// Sign and publish the public key of every unannounced eon. An eon is
    /// only marked as published once the message went out.
    pub async fn publish_pending(&self) -> Result<usize, KeyperError> {
        let mut published = 0;
        for eon in self.deps.store.unpublished_eons() {
            let Some(dkg) = self.deps.store.dkg_result(eon.eon) else {
                continue;
            };
            let Some(dkg) = dkg.success() else {
                continue;
            };
            let message = EonPublicKey::new_signed(
                self.deps.settings.instance_id,
                dkg.public_key.to_vec(),
                eon.activation_block,
                eon.keyper_config_index,
                eon.eon,
                dkg.keyper_index,
                &self.deps.key,
            )?;
            self.deps.sender.send_message(message.into_p2p()).await?;
            self.deps.store.mark_eon_published(eon.eon)?;
            info!(
                eon = eon.eon,
                activation_block = eon.activation_block,
                keyper_index = dkg.keyper_index,
                "published eon public key"
            );
            published += 1;
        }
        Ok(published)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if let Err(e) = self.publish_pending().await {
                warn!(error = %e, "failed to publish eon public key");
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
        debug!("eon publisher stopped");
    }
}
