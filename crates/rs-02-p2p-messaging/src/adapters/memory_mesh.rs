//! # In-Memory Gossip Mesh
//!
//! A process-local gossip network. Every [`MeshEndpoint`] joined to the same
//! [`InMemoryMesh`] can connect to the others by peer id and exchange
//! messages on subscribed topics. There is no peer scoring; every endpoint
//! records the validation outcomes reported to it instead.
//!
//! Used by unit tests, the integration suite and the local devnet.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rs_01_p2p_schema::Topic;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::{MeshParams, PeerId, TransportError, ValidationResult};
use crate::ports::{GossipTransport, InboundMessage};

/// Per-endpoint inbox capacity. Messages beyond it are dropped.
pub const DEFAULT_INBOX_CAPACITY: usize = 1024;

struct Slot {
    inbox: mpsc::Sender<InboundMessage>,
    topics: HashSet<Topic>,
    /// Bootstrap nodes (mesh degree 0) never receive topic traffic.
    meshes: bool,
    connections: HashSet<PeerId>,
}

/// Shared hub all endpoints are joined to.
#[derive(Default)]
pub struct InMemoryMesh {
    slots: RwLock<HashMap<PeerId, Slot>>,
    next_message_id: AtomicU64,
}

impl InMemoryMesh {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Join the mesh as `peer_id`. Joining twice with the same id replaces
    /// the earlier endpoint.
    pub fn join(self: &Arc<Self>, peer_id: PeerId, mesh_params: MeshParams) -> MeshEndpoint {
        let (tx, rx) = mpsc::channel(DEFAULT_INBOX_CAPACITY);
        self.slots.write().insert(
            peer_id,
            Slot {
                inbox: tx,
                topics: HashSet::new(),
                meshes: mesh_params.joins_mesh(),
                connections: HashSet::new(),
            },
        );
        debug!(peer = %peer_id, "joined in-memory mesh");
        MeshEndpoint {
            mesh: Arc::clone(self),
            peer_id,
            inbox: tokio::sync::Mutex::new(rx),
            reports: Mutex::new(Vec::new()),
        }
    }

    pub fn peer_count(&self) -> usize {
        self.slots.read().len()
    }

    fn leave(&self, peer_id: &PeerId) {
        let mut slots = self.slots.write();
        slots.remove(peer_id);
        for slot in slots.values_mut() {
            slot.connections.remove(peer_id);
        }
    }

    fn subscribe(&self, peer_id: &PeerId, topic: Topic) -> Result<(), TransportError> {
        let mut slots = self.slots.write();
        let slot = slots.get_mut(peer_id).ok_or(TransportError::Closed)?;
        slot.topics.insert(topic);
        Ok(())
    }

    fn connect(&self, from: PeerId, to: PeerId) -> Result<(), TransportError> {
        let mut slots = self.slots.write();
        if !slots.contains_key(&from) {
            return Err(TransportError::Closed);
        }
        let remote = slots.get_mut(&to).ok_or(TransportError::Unreachable(to))?;
        remote.connections.insert(from);
        if let Some(local) = slots.get_mut(&from) {
            local.connections.insert(to);
        }
        Ok(())
    }

    fn connections(&self, peer_id: &PeerId) -> Vec<PeerId> {
        self.slots
            .read()
            .get(peer_id)
            .map(|s| s.connections.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Deliver to every other online endpoint subscribed to `topic`.
    fn publish(&self, from: PeerId, topic: Topic, data: Vec<u8>) -> Result<usize, TransportError> {
        let slots = self.slots.read();
        let sender = slots.get(&from).ok_or(TransportError::Closed)?;
        if sender.connections.is_empty() {
            return Err(TransportError::PublishFailed(
                "not connected to any peer".to_string(),
            ));
        }

        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed).to_be_bytes().to_vec();
        let mut delivered = 0;
        for (peer_id, slot) in slots.iter() {
            if *peer_id == from
                || !slot.meshes
                || slot.connections.is_empty()
                || !slot.topics.contains(&topic)
            {
                continue;
            }
            let message = InboundMessage {
                id: id.clone(),
                topic,
                data: data.clone(),
                from,
            };
            match slot.inbox.try_send(message) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(peer = %peer_id, %topic, error = %e, "dropping gossip message"),
            }
        }
        Ok(delivered)
    }
}

/// One node's handle on an [`InMemoryMesh`].
pub struct MeshEndpoint {
    mesh: Arc<InMemoryMesh>,
    peer_id: PeerId,
    inbox: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
    reports: Mutex<Vec<(PeerId, ValidationResult)>>,
}

impl MeshEndpoint {
    /// Validation outcomes reported so far, by propagating peer.
    pub fn validation_reports(&self) -> Vec<(PeerId, ValidationResult)> {
        self.reports.lock().clone()
    }
}

impl Drop for MeshEndpoint {
    fn drop(&mut self) {
        self.mesh.leave(&self.peer_id);
    }
}

#[async_trait]
impl GossipTransport for MeshEndpoint {
    fn local_peer_id(&self) -> PeerId {
        self.peer_id
    }

    async fn subscribe(&self, topic: Topic) -> Result<(), TransportError> {
        self.mesh.subscribe(&self.peer_id, topic)
    }

    async fn publish(&self, topic: Topic, data: Vec<u8>) -> Result<(), TransportError> {
        let delivered = self.mesh.publish(self.peer_id, topic, data)?;
        debug!(%topic, delivered, "published gossip message");
        Ok(())
    }

    async fn next_message(&self) -> Option<InboundMessage> {
        self.inbox.lock().await.recv().await
    }

    fn report_validation(&self, message: &InboundMessage, result: ValidationResult) {
        debug!(from = %message.from, topic = %message.topic, ?result, "validation reported");
        self.reports.lock().push((message.from, result));
    }

    async fn connect(&self, peer: &PeerId) -> Result<(), TransportError> {
        self.mesh.connect(self.peer_id, *peer)
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.mesh.connections(&self.peer_id)
    }
}
