//! # Keyper
//!
//! ```text
//!   p2p ──► TriggerHandler ──┐
//!   p2p ──► SharesHandler  ──┼──► EpochKeyGenerator ──► store
//!   p2p ──► KeysHandler    ──┘                    └───► p2p
//!   p2p ──► EonKeyHandler
//!   add_eon ──► store ──► EonPublisher ──► p2p
//! ```

use std::sync::Arc;

use rs_01_p2p_schema::{DecryptionKeyShares, DecryptionKeys, DecryptionTrigger, EonPublicKey};
use rs_02_p2p_messaging::{GossipTransport, P2PMessaging};
use shared_types::IdentityPreimage;
use tokio::sync::{watch, Notify};
use tracing::info;

use crate::domain::{DkgResult, Eon, KeyperError};
use crate::ports::KeyperApi;
use crate::service::{
    EonKeyHandler, EonPublisher, EpochKeyGenerator, KeyperDependencies, KeysHandler,
    SharesHandler, TriggerHandler,
};

pub struct Keyper {
    deps: KeyperDependencies,
    triggers: Arc<TriggerHandler>,
    shares: Arc<SharesHandler>,
    keys: Arc<KeysHandler>,
    eon_keys: Arc<EonKeyHandler>,
    publisher: Arc<EonPublisher>,
    publish: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
}

impl Keyper {
    pub fn new(deps: KeyperDependencies, shutdown: watch::Receiver<bool>) -> Self {
        let generator = Arc::new(EpochKeyGenerator::new(deps.clone()));
        let publish = Arc::new(Notify::new());
        Self {
            triggers: Arc::new(TriggerHandler::new(deps.clone(), Arc::clone(&generator))),
            shares: Arc::new(SharesHandler::new(deps.clone(), generator)),
            keys: Arc::new(KeysHandler::new(deps.clone())),
            eon_keys: Arc::new(EonKeyHandler::new(deps.clone())),
            publisher: Arc::new(EonPublisher::new(deps.clone(), Arc::clone(&publish))),
            publish,
            deps,
            shutdown,
        }
    }

    pub fn register<T: GossipTransport + 'static>(&self, messaging: &mut P2PMessaging<T>) {
        messaging.add_message_handler::<DecryptionTrigger, _>(Arc::clone(&self.triggers));
        messaging.add_message_handler::<DecryptionKeyShares, _>(Arc::clone(&self.shares));
        messaging.add_message_handler::<DecryptionKeys, _>(Arc::clone(&self.keys));
        messaging.add_message_handler::<EonPublicKey, _>(Arc::clone(&self.eon_keys));
    }

    /// Run the eon publisher until shutdown. Message handling runs inside
    /// the messaging service the keyper was registered with.
    pub async fn run(&self) -> Result<(), KeyperError> {
        info!(address = %hex::encode(self.deps.key.address()), "keyper started");
        self.publisher.run(self.shutdown.clone()).await;
        info!("keyper stopped");
        Ok(())
    }
}

impl KeyperApi for Keyper {
    fn add_eon(&self, eon: Eon, dkg: DkgResult) -> Result<(), KeyperError> {
        if let Some(result) = dkg.success() {
            let keyper_set = self
                .deps
                .chain
                .keyper_set(eon.keyper_config_index)
                .ok_or_else(|| {
                    KeyperError::InvalidDkgResult(format!(
                        "unknown keyper config index {}",
                        eon.keyper_config_index
                    ))
                })?;
            if keyper_set.keypers.len() as u64 != result.num_keypers
                || keyper_set.threshold != result.threshold
            {
                return Err(KeyperError::InvalidDkgResult(format!(
                    "DKG for {} of {} keypers does not match keyper set {} ({} of {})",
                    result.threshold,
                    result.num_keypers,
                    keyper_set.index,
                    keyper_set.threshold,
                    keyper_set.keypers.len()
                )));
            }
        }
        self.deps.store.insert_eon(eon, dkg)?;
        info!(
            eon = eon.eon,
            activation_block = eon.activation_block,
            keyper_config_index = eon.keyper_config_index,
            "eon added"
        );
        self.publish.notify_one();
        Ok(())
    }

    fn decryption_key(&self, eon: u64, identity: &IdentityPreimage) -> Option<Vec<u8>> {
        self.deps.store.decryption_key(eon, identity)
    }
}
