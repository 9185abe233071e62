//! # Collator
//!
//! Wires the collator tasks together and registers its message handlers.
//!
//! ```text
//!   users ──► BatchHandler ──► batch tasks ──► store ──► TriggerSender ──► p2p
//!                  ▲                             │
//!   p2p ──► KeysHandler                          └────► BatchSubmitter ──► sequencer
//!   p2p ──► EonKeyHandler ──► store
//! ```

use std::sync::Arc;

use rs_01_p2p_schema::{DecryptionKeys, DecryptionTrigger, EonPublicKey, Message};
use rs_02_p2p_messaging::{GossipTransport, P2PMessaging};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::domain::CollatorError;
use crate::service::{
    BatchHandler, BatchSubmitter, CollatorDependencies, EonKeyHandler, KeysHandler,
    TriggerSender, Wakeups,
};

pub struct Collator {
    batches: Arc<BatchHandler>,
    eon_keys: Arc<EonKeyHandler>,
    keys: Arc<KeysHandler>,
    triggers: Arc<TriggerSender>,
    submitter: Arc<BatchSubmitter>,
    shutdown: watch::Receiver<bool>,
}

impl Collator {
    /// Build every task. Initialises the batch pool and recovers persisted
    /// transactions before returning.
    pub async fn new(
        deps: CollatorDependencies,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, CollatorError> {
        let wakeups = Wakeups::default();
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let batches =
            BatchHandler::new(deps.clone(), wakeups.clone(), outcomes_rx, shutdown.clone()).await?;

        Ok(Self {
            eon_keys: Arc::new(EonKeyHandler::new(deps.clone())),
            keys: Arc::new(KeysHandler::new(Arc::clone(&batches), deps.clone())),
            triggers: Arc::new(TriggerSender::new(deps.clone(), wakeups.triggers)),
            submitter: Arc::new(BatchSubmitter::new(deps, wakeups.submitter, outcomes_tx)),
            batches,
            shutdown,
        })
    }

    /// Register the collator's handlers. Triggers are only published, but
    /// the topic is joined so that peers relay them.
    pub fn register<T: GossipTransport + 'static>(&self, messaging: &mut P2PMessaging<T>) {
        messaging.add_message_handler::<EonPublicKey, _>(Arc::clone(&self.eon_keys));
        messaging.add_message_handler::<DecryptionKeys, _>(Arc::clone(&self.keys));
        messaging.add_gossip_topic(DecryptionTrigger::TOPIC);
    }

    /// The user-facing API, see [`crate::ports::CollatorApi`].
    pub fn handler(&self) -> Arc<BatchHandler> {
        Arc::clone(&self.batches)
    }

    /// Run every task until shutdown.
    pub async fn run(&self) -> Result<(), CollatorError> {
        info!("collator started");
        let batches = tokio::spawn(Arc::clone(&self.batches).run());
        let triggers = {
            let triggers = Arc::clone(&self.triggers);
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move { triggers.run(shutdown).await })
        };
        let submitter = {
            let submitter = Arc::clone(&self.submitter);
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move { submitter.run(shutdown).await })
        };

        let result = join("batch handler", batches).await?;
        join("trigger sender", triggers).await?;
        join("batch submitter", submitter).await?;
        info!("collator stopped");
        result
    }
}

async fn join<R>(task: &str, handle: JoinHandle<R>) -> Result<R, CollatorError> {
    handle
        .await
        .map_err(|e| CollatorError::Inconsistent(format!("{task} task failed: {e}")))
}
