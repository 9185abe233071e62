//! Composed network behaviour: gossipsub for topic traffic, Kademlia for
//! peer discovery and identify to learn the addresses peers listen on.

use libp2p::identity::{self, Keypair};
use libp2p::swarm::NetworkBehaviour;
use libp2p::{gossipsub, identify, kad, StreamProtocol};

use crate::domain::{Environment, MeshParams, PeerId, TransportError};

use super::scoring;

/// Identify protocol version announced to peers.
const IDENTIFY_PROTOCOL: &str = "/shutter/id/1.0.0";

/// Largest gossip payload accepted or published.
const MAX_TRANSMIT_SIZE: usize = 1 << 20;

#[derive(NetworkBehaviour)]
pub(super) struct ShutterBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub identify: identify::Behaviour,
}

impl ShutterBehaviour {
    pub fn new(
        key: &Keypair,
        mesh: MeshParams,
        environment: Environment,
        is_bootstrap_node: bool,
    ) -> Result<Self, TransportError> {
        let local = key.public().to_peer_id();
        Ok(Self {
            gossipsub: build_gossipsub(key, mesh, environment)?,
            kademlia: build_kademlia(local, environment, is_bootstrap_node)?,
            identify: identify::Behaviour::new(identify::Config::new(
                IDENTIFY_PROTOCOL.to_string(),
                key.public(),
            )),
        })
    }
}

fn build_gossipsub(
    key: &Keypair,
    mesh: MeshParams,
    environment: Environment,
) -> Result<gossipsub::Behaviour, TransportError> {
    let mut config_builder = gossipsub::ConfigBuilder::default();
    config_builder
        .validation_mode(gossipsub::ValidationMode::Strict)
        .validate_messages()
        .max_transmit_size(MAX_TRANSMIT_SIZE)
        .mesh_n(mesh.d)
        .mesh_n_low(mesh.d_lo)
        .mesh_n_high(mesh.d_hi)
        .mesh_outbound_min(mesh.d_out);
    let config = config_builder
        .build()
        .map_err(|e| TransportError::Setup(format!("gossipsub config: {e}")))?;

    let mut behaviour =
        gossipsub::Behaviour::new(gossipsub::MessageAuthenticity::Signed(key.clone()), config)
            .map_err(|e| TransportError::Setup(format!("gossipsub: {e}")))?;
    behaviour
        .with_peer_score(
            scoring::peer_score_params(environment.is_testing()),
            scoring::peer_score_thresholds(),
        )
        .map_err(|e| TransportError::Setup(format!("peer score: {e}")))?;
    Ok(behaviour)
}

fn build_kademlia(
    local: libp2p::PeerId,
    environment: Environment,
    is_bootstrap_node: bool,
) -> Result<kad::Behaviour<kad::store::MemoryStore>, TransportError> {
    let protocol = StreamProtocol::try_from_owned(environment.dht_protocol())
        .map_err(|e| TransportError::Setup(format!("dht protocol: {e}")))?;
    let mut config = kad::Config::default();
    config.set_protocol_names(vec![protocol]);

    let mut kademlia =
        kad::Behaviour::with_config(local, kad::store::MemoryStore::new(local), config);
    // automatic mode keeps unreachable local nodes in client mode
    if is_bootstrap_node || environment == Environment::Local {
        kademlia.set_mode(Some(kad::Mode::Server));
    }
    Ok(kademlia)
}

// =============================================================================
// IDENTITY CONVERSIONS
// =============================================================================

/// Multihash code of the identity hash, used for keys short enough to be
/// inlined into the peer id.
const IDENTITY_MULTIHASH: u64 = 0x00;

pub(super) fn keypair(seed: &mut [u8; 32]) -> Result<Keypair, TransportError> {
    Keypair::ed25519_from_bytes(seed).map_err(|e| TransportError::Setup(format!("p2p key: {e}")))
}

pub(super) fn to_libp2p(peer: &PeerId) -> Result<libp2p::PeerId, TransportError> {
    let key = identity::ed25519::PublicKey::try_from_bytes(peer.as_bytes())
        .map_err(|_| TransportError::Unreachable(*peer))?;
    Ok(identity::PublicKey::from(key).to_peer_id())
}

/// `None` for peers whose id does not inline an ed25519 key.
pub(super) fn from_libp2p(peer: &libp2p::PeerId) -> Option<PeerId> {
    let multihash = peer.as_ref();
    if multihash.code() != IDENTITY_MULTIHASH {
        return None;
    }
    let key = identity::PublicKey::try_decode_protobuf(multihash.digest())
        .ok()?
        .try_into_ed25519()
        .ok()?;
    Some(PeerId::from_bytes(key.to_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::P2pKey;

    #[test]
    fn test_peer_id_conversion_matches_keypair() {
        let key = P2pKey::from_seed([7u8; 32]);
        let libp2p_key = keypair(&mut key.seed()).unwrap();

        let converted = to_libp2p(&key.peer_id()).unwrap();
        assert_eq!(converted, libp2p_key.public().to_peer_id());
        assert_eq!(from_libp2p(&converted), Some(key.peer_id()));
    }

    #[test]
    fn test_foreign_peer_id_not_converted() {
        assert_eq!(from_libp2p(&libp2p::PeerId::random()), None);
    }

    #[test]
    fn test_behaviour_for_bootstrap_node() {
        let key = Keypair::generate_ed25519();
        let behaviour =
            ShutterBehaviour::new(&key, MeshParams::for_bootstrap_node(), Environment::Staging, true);
        assert!(behaviour.is_ok());
    }
}
