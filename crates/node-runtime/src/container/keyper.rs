//! # Keyper Container
//!
//! A standalone keyper on the libp2p transport. Its share of the committee
//! eon comes from the trusted dealer configured in [`CommitteeConfig`].
//!
//! [`CommitteeConfig`]: crate::container::CommitteeConfig

use std::sync::Arc;

use rs_02_p2p_messaging::{GossipTransport, Libp2pTransport, P2PMessaging};
use rs_04_keyper::{InMemoryKeyperStore, Keyper, KeyperApi, KeyperDependencies};
use shared_types::InMemoryChainObserver;
use shutter_telemetry::TracingHandle;
use tokio::sync::watch;
use tracing::info;

use crate::container::{KeyperNodeConfig, NodeError, SwarmMessaging};

pub struct KeyperContainer {
    pub config: KeyperNodeConfig,
    pub index: u64,
    pub keyper: Arc<Keyper>,
    pub messaging: Arc<SwarmMessaging>,
    pub transport: Arc<Libp2pTransport>,
    pub store: Arc<InMemoryKeyperStore>,
    pub chain: Arc<InMemoryChainObserver>,
}

impl KeyperContainer {
    pub async fn new(
        config: KeyperNodeConfig,
        tracing: TracingHandle,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let index = config.keyper_index()?;
        let key = Arc::new(config.keyper.signing_key()?);
        let chain = Arc::new(config.committee.chain_observer());

        let plan = config.keyper.p2p.bootstrap_plan()?;
        let transport = Arc::new(Libp2pTransport::start(&config.keyper.p2p, &plan).await?);
        let mut messaging = P2PMessaging::new(Arc::clone(&transport), plan, tracing);

        let store = Arc::new(InMemoryKeyperStore::new());
        let deps = KeyperDependencies {
            settings: config.keyper.settings(),
            key: Arc::clone(&key),
            store: store.clone(),
            chain: chain.clone(),
            sender: Arc::new(messaging.sender()),
        };
        let keyper = Arc::new(Keyper::new(deps, shutdown));
        keyper.register(&mut messaging);
        keyper.add_eon(config.committee.eon(), config.committee.dkg_result(index)?)?;

        info!(
            index,
            keyper = %hex::encode(key.address()),
            eon = config.committee.eon,
            peer_id = %transport.local_peer_id(),
            listen = ?transport.listen_addresses(),
            "keyper assembled"
        );
        Ok(Self {
            config,
            index,
            keyper,
            messaging: Arc::new(messaging),
            transport,
            store,
            chain,
        })
    }
}
