//! # Collator Container
//!
//! A standalone collator. Initialization order:
//!
//! 1. chain observer seeded from the committee configuration
//! 2. JSON-RPC clients for the sequencer and the L1 node
//! 3. libp2p transport listening on the configured addresses
//! 4. collator with its handlers registered on the messaging service

use std::sync::Arc;

use rs_02_p2p_messaging::{GossipTransport, Libp2pTransport, P2PMessaging};
use rs_03_collator::{
    Collator, CollatorDependencies, CollatorError, InMemoryCollatorStore, JsonRpcSequencer,
    SystemTimeSource,
};
use shared_types::InMemoryChainObserver;
use shutter_telemetry::TracingHandle;
use tokio::sync::watch;
use tracing::info;

use crate::container::{CollatorNodeConfig, NodeError};

pub type SwarmMessaging = P2PMessaging<Libp2pTransport>;

pub struct CollatorContainer {
    pub config: CollatorNodeConfig,
    pub collator: Arc<Collator>,
    pub messaging: Arc<SwarmMessaging>,
    pub transport: Arc<Libp2pTransport>,
    pub store: Arc<InMemoryCollatorStore>,
    pub chain: Arc<InMemoryChainObserver>,
}

impl CollatorContainer {
    pub async fn new(
        config: CollatorNodeConfig,
        tracing: TracingHandle,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let settings = &config.collator;
        let key = Arc::new(settings.signing_key()?);
        let chain = Arc::new(config.committee.chain_observer());

        let sequencer =
            Arc::new(JsonRpcSequencer::new(&settings.sequencer_url).map_err(CollatorError::from)?);
        let l1 = Arc::new(JsonRpcSequencer::new(&settings.ethereum_url).map_err(CollatorError::from)?);

        let plan = settings.p2p.bootstrap_plan()?;
        let transport = Arc::new(Libp2pTransport::start(&settings.p2p, &plan).await?);
        let mut messaging = P2PMessaging::new(Arc::clone(&transport), plan, tracing);

        let store = Arc::new(InMemoryCollatorStore::new());
        let deps = CollatorDependencies {
            settings: settings.settings(),
            key: Arc::clone(&key),
            sequencer,
            l1,
            store: store.clone(),
            chain: chain.clone(),
            time: Arc::new(SystemTimeSource),
            sender: Arc::new(messaging.sender()),
        };
        let collator = Arc::new(Collator::new(deps, shutdown).await?);
        collator.register(&mut messaging);

        info!(
            collator = %hex::encode(key.address()),
            peer_id = %transport.local_peer_id(),
            listen = ?transport.listen_addresses(),
            sequencer = %settings.sequencer_url,
            ethereum = %settings.ethereum_url,
            "collator assembled"
        );
        Ok(Self {
            config,
            collator,
            messaging: Arc::new(messaging),
            transport,
            store,
            chain,
        })
    }
}
