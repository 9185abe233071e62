//! # Driven Ports (Outbound SPI)
//!
//! The gossip mesh the messaging layer runs on. Deployments use
//! [`crate::adapters::Libp2pTransport`]; unit tests and the devnet use
//! [`crate::adapters::InMemoryMesh`].

use async_trait::async_trait;
use rs_01_p2p_schema::Topic;

use crate::domain::{PeerId, TransportError, ValidationResult};

/// Raw gossip payload as received from the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Transport message id, handed back with the validation result.
    pub id: Vec<u8>,
    pub topic: Topic,
    pub data: Vec<u8>,
    /// Peer the message was propagated by.
    pub from: PeerId,
}

/// Topic based publish/subscribe with peer scoring.
///
/// # Thread Safety
///
/// `publish` may be called concurrently from any task.
#[async_trait]
pub trait GossipTransport: Send + Sync {
    fn local_peer_id(&self) -> PeerId;

    /// Join `topic`; messages on it become visible through [`Self::next_message`].
    async fn subscribe(&self, topic: Topic) -> Result<(), TransportError>;

    async fn publish(&self, topic: Topic, data: Vec<u8>) -> Result<(), TransportError>;

    /// Next message from a peer that is not graylisted. `None` once closed.
    async fn next_message(&self) -> Option<InboundMessage>;

    /// Complete validation of `message`. Accepted messages are forwarded,
    /// rejected ones count against the propagating peer's score and ignored
    /// ones are dropped without penalty.
    fn report_validation(&self, message: &InboundMessage, result: ValidationResult);

    async fn connect(&self, peer: &PeerId) -> Result<(), TransportError>;

    fn connected_peers(&self) -> Vec<PeerId>;
}
