//! # Devnet Container
//!
//! Builds every node of the devnet and wires it to the shared in-memory
//! mesh. Initialization order:
//!
//! 1. chain observer: keyper set 0 and the collator, both active from block 0
//! 2. mock sequencer with the funded accounts
//! 3. one mesh endpoint and messaging service per node, topics joined
//! 4. collator, then keypers, handlers registered with their messaging
//! 5. trusted-dealer DKG handed to every keyper via `add_eon`

use std::sync::Arc;
use std::time::Duration;

use rs_02_p2p_messaging::config::DEFAULT_LISTEN_ADDRESS;
use rs_02_p2p_messaging::{
    BootstrapAddress, GossipTransport, InMemoryMesh, MeshEndpoint, P2PMessaging, P2pConfig,
};
use rs_03_collator::{
    Collator, CollatorDependencies, InMemoryCollatorStore, MockSequencer, SystemTimeSource,
};
use rs_04_keyper::{
    DkgResult, Eon, InMemoryKeyperStore, Keyper, KeyperApi, KeyperDependencies, PureDkgResult,
};
use shared_crypto::ThresholdKeyGen;
use shared_types::{InMemoryChainObserver, KeyperSet};
use shutter_telemetry::TracingHandle;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::container::{NodeConfig, NodeError};

pub type MeshMessaging = P2PMessaging<MeshEndpoint>;

/// Eon created by the devnet dealer.
pub const DEVNET_EON: u64 = 1;
pub const DEVNET_KEYPER_CONFIG_INDEX: u64 = 0;

pub struct CollatorNode {
    pub collator: Arc<Collator>,
    pub messaging: Arc<MeshMessaging>,
    pub endpoint: Arc<MeshEndpoint>,
    pub store: Arc<InMemoryCollatorStore>,
}

pub struct KeyperNode {
    pub index: u64,
    pub keyper: Arc<Keyper>,
    pub messaging: Arc<MeshMessaging>,
    pub endpoint: Arc<MeshEndpoint>,
    pub store: Arc<InMemoryKeyperStore>,
}

pub struct DevnetContainer {
    pub config: NodeConfig,
    pub mesh: Arc<InMemoryMesh>,
    pub chain: Arc<InMemoryChainObserver>,
    pub sequencer: Arc<MockSequencer>,
    pub collator: CollatorNode,
    pub keypers: Vec<KeyperNode>,
}

impl DevnetContainer {
    pub async fn new(
        config: NodeConfig,
        tracing: TracingHandle,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let devnet = &config.devnet;

        let collator_key = Arc::new(config.collator.signing_key()?);
        let keyper_keys = config
            .keypers
            .iter()
            .map(|k| k.signing_key().map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let chain = Arc::new(InMemoryChainObserver::new());
        chain.add_keyper_set(KeyperSet {
            index: DEVNET_KEYPER_CONFIG_INDEX,
            activation_block: 0,
            keypers: keyper_keys.iter().map(|k| k.address()).collect(),
            threshold: devnet.threshold,
        });
        chain.add_collator(0, collator_key.address());

        let sequencer = Arc::new(MockSequencer::new(
            devnet.chain_id,
            collator_key.address(),
            devnet.base_fee,
            devnet.gas_limit,
        ));
        for account in &devnet.funded_accounts {
            sequencer.set_balance(*account, devnet.initial_balance);
        }

        let mesh = InMemoryMesh::new();
        let collator_address = own_address(&config.collator.p2p);
        let first_keyper_address = config
            .keypers
            .first()
            .map(|k| own_address(&k.p2p))
            .ok_or(NodeError::Task("devnet without keypers".to_string()))?;

        // collator
        let (endpoint, mut messaging) =
            join_mesh(&mesh, &config.collator.p2p, &first_keyper_address, tracing)?;
        let store = Arc::new(InMemoryCollatorStore::new());
        let deps = CollatorDependencies {
            settings: config.collator.settings(),
            key: Arc::clone(&collator_key),
            sequencer: sequencer.clone(),
            l1: sequencer.clone(),
            store: store.clone(),
            chain: chain.clone(),
            time: Arc::new(SystemTimeSource),
            sender: Arc::new(messaging.sender()),
        };
        let collator = Arc::new(Collator::new(deps, shutdown.clone()).await?);
        collator.register(&mut messaging);
        subscribe_topics(&endpoint, &messaging).await?;
        let collator = CollatorNode {
            collator,
            messaging: Arc::new(messaging),
            endpoint,
            store,
        };

        // keypers
        let dealer = ThresholdKeyGen::new(devnet.num_keypers, devnet.threshold, devnet.dkg_seed)?
            .generate()?;
        let eon = Eon {
            eon: DEVNET_EON,
            activation_block: 0,
            keyper_config_index: DEVNET_KEYPER_CONFIG_INDEX,
        };
        let mut keypers = Vec::with_capacity(config.keypers.len());
        for (index, (keyper_config, key)) in config.keypers.iter().zip(keyper_keys).enumerate() {
            let index = index as u64;
            let (endpoint, mut messaging) =
                join_mesh(&mesh, &keyper_config.p2p, &collator_address, tracing)?;
            let store = Arc::new(InMemoryKeyperStore::new());
            let deps = KeyperDependencies {
                settings: keyper_config.settings(),
                key,
                store: store.clone(),
                chain: chain.clone(),
                sender: Arc::new(messaging.sender()),
            };
            let keyper = Arc::new(Keyper::new(deps, shutdown.clone()));
            keyper.register(&mut messaging);
            subscribe_topics(&endpoint, &messaging).await?;
            keyper.add_eon(
                eon,
                DkgResult::Success(PureDkgResult::from_dealer(DEVNET_EON, index, &dealer)?),
            )?;
            keypers.push(KeyperNode {
                index,
                keyper,
                messaging: Arc::new(messaging),
                endpoint,
                store,
            });
        }

        info!(
            keypers = keypers.len(),
            threshold = devnet.threshold,
            collator = %hex::encode(collator_key.address()),
            eon_public_key = %hex::encode(dealer.eon_public_key.as_bytes()),
            "devnet assembled"
        );
        Ok(Self {
            config,
            mesh,
            chain,
            sequencer,
            collator,
            keypers,
        })
    }

    /// Wait until every node has at least one peer.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), NodeError> {
        let endpoints: Vec<&Arc<MeshEndpoint>> = std::iter::once(&self.collator.endpoint)
            .chain(self.keypers.iter().map(|k| &k.endpoint))
            .collect();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let waiting = endpoints
                .iter()
                .filter(|e| e.connected_peers().is_empty())
                .count();
            if waiting == 0 {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(NodeError::Task(format!(
                    "{waiting} nodes still unconnected after {timeout:?}"
                )));
            }
            debug!(waiting, "waiting for mesh connections");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

fn own_address(p2p: &P2pConfig) -> BootstrapAddress {
    BootstrapAddress {
        transport: p2p
            .listen_addresses
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string()),
        peer_id: p2p.peer_id(),
    }
}

/// Join `mesh` with the node's peer id. Nodes without configured bootstrap
/// peers bootstrap off `fallback`.
fn join_mesh(
    mesh: &Arc<InMemoryMesh>,
    p2p: &P2pConfig,
    fallback: &BootstrapAddress,
    tracing: TracingHandle,
) -> Result<(Arc<MeshEndpoint>, MeshMessaging), NodeError> {
    let mut p2p = p2p.clone();
    if p2p.custom_bootstrap_addresses.is_empty() {
        p2p.custom_bootstrap_addresses = vec![fallback.clone()];
    }
    let plan = p2p.bootstrap_plan()?;
    let endpoint = Arc::new(mesh.join(p2p.peer_id(), p2p.mesh_params(&plan)));
    let messaging = P2PMessaging::new(Arc::clone(&endpoint), plan, tracing);
    Ok((endpoint, messaging))
}

/// Join every topic of `messaging` before any node starts publishing.
async fn subscribe_topics(
    endpoint: &MeshEndpoint,
    messaging: &MeshMessaging,
) -> Result<(), NodeError> {
    for topic in messaging.topics() {
        endpoint.subscribe(topic).await?;
    }
    Ok(())
}
