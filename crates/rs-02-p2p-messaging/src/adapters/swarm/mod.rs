//! # libp2p Transport
//!
//! [`GossipTransport`] over a libp2p swarm: gossipsub with the network's
//! peer scoring, a Kademlia DHT under the environment's protocol id for peer
//! discovery, TCP with noise and yamux underneath.
//!
//! The swarm is owned by a driver task; [`Libp2pTransport`] talks to it over
//! a command channel.
//!
//! ```text
//! Libp2pTransport ──Command──► driver task ──► Swarm<ShutterBehaviour>
//!        ▲                          │
//!        └──────InboundMessage──────┘
//! ```
//!
//! - Messages are held by gossipsub until the validation result is reported;
//!   rejected ones count against the propagating peer's score.
//! - Every node provides the discovery namespace in the DHT and looks up the
//!   other providers while it has fewer than [`PEER_TARGET`] connections.
//! - Bootstrap peers get [`BOOTSTRAP_APP_SCORE`] once connected.

mod behaviour;
pub mod scoring;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::gossipsub::{self, IdentTopic, MessageAcceptance, MessageId};
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::SwarmEvent;
use libp2p::{identify, kad, noise, tcp, yamux, Multiaddr, Swarm, SwarmBuilder};
use parking_lot::RwLock;
use rs_01_p2p_schema::Topic;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::P2pConfig;
use crate::domain::{
    BootstrapPlan, PeerId, TransportError, ValidationResult, BOOTSTRAP_APP_SCORE, PEER_TARGET,
};
use crate::ports::{GossipTransport, InboundMessage};

use behaviour::{ShutterBehaviour, ShutterBehaviourEvent};

/// Capacity of the command and inbound message channels.
const CHANNEL_CAPACITY: usize = 1024;
const DISCOVERY_INTERVAL: Duration = Duration::from_secs(10);
const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
const LISTEN_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

type Reply<T> = oneshot::Sender<Result<T, TransportError>>;

enum Command {
    Subscribe { topic: Topic, reply: Reply<()> },
    Publish { topic: Topic, data: Vec<u8>, reply: Reply<()> },
    Report { id: MessageId, result: ValidationResult },
    Dial { peer: libp2p::PeerId, reply: Reply<()> },
    PeerScore { peer: libp2p::PeerId, reply: oneshot::Sender<Option<f64>> },
}

/// Gossip transport backed by a libp2p swarm.
pub struct Libp2pTransport {
    peer_id: PeerId,
    commands: mpsc::Sender<Command>,
    inbox: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
    connected: Arc<RwLock<HashSet<PeerId>>>,
    listen_addresses: Vec<Multiaddr>,
    driver: JoinHandle<()>,
}

impl Libp2pTransport {
    /// Build the swarm, start listening and spawn the driver. Returns once
    /// every listen address is bound.
    pub async fn start(config: &P2pConfig, plan: &BootstrapPlan) -> Result<Self, TransportError> {
        let key = behaviour::keypair(&mut config.p2p_key.seed())?;
        let mesh = config.mesh_params(plan);
        let environment = config.environment;
        let is_bootstrap_node = plan.is_bootstrap_node;

        let mut swarm = SwarmBuilder::with_existing_identity(key)
            .with_tokio()
            .with_tcp(
                tcp::Config::default().nodelay(true),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| TransportError::Setup(e.to_string()))?
            .with_behaviour(|key| {
                ShutterBehaviour::new(key, mesh, environment, is_bootstrap_node)
                    .map_err(Box::<dyn std::error::Error + Send + Sync>::from)
            })
            .map_err(|e| TransportError::Setup(e.to_string()))?
            .with_swarm_config(|c| c.with_idle_connection_timeout(IDLE_CONNECTION_TIMEOUT))
            .build();

        for address in &config.listen_addresses {
            let address = parse_multiaddr(address)?;
            swarm
                .listen_on(address)
                .map_err(|e| TransportError::Setup(e.to_string()))?;
        }
        for address in &config.advertise_addresses {
            swarm.add_external_address(parse_multiaddr(address)?);
        }

        let mut bootstrap_peers = HashSet::new();
        for address in &plan.peers {
            let peer = behaviour::to_libp2p(&address.peer_id)?;
            let transport = parse_multiaddr(&address.transport)?;
            swarm.behaviour_mut().kademlia.add_address(&peer, transport);
            bootstrap_peers.insert(peer);
        }

        let listen_addresses =
            wait_for_listeners(&mut swarm, config.listen_addresses.len()).await?;

        let peer_id = config.peer_id();
        let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbox_tx, inbox_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let connected = Arc::new(RwLock::new(HashSet::new()));

        let driver = Driver {
            swarm,
            commands: command_rx,
            inbox: inbox_tx,
            connected: Arc::clone(&connected),
            bootstrap_peers,
            namespace: kad::RecordKey::new(&config.discovery_namespace),
            providing: false,
            pending_dials: HashMap::new(),
            pending_validation: HashMap::new(),
        };
        info!(
            %peer_id,
            listen = ?listen_addresses,
            dht_protocol = %environment.dht_protocol(),
            namespace = %config.discovery_namespace,
            bootstrap_node = is_bootstrap_node,
            "libp2p transport started"
        );

        Ok(Self {
            peer_id,
            commands: command_tx,
            inbox: tokio::sync::Mutex::new(inbox_rx),
            connected,
            listen_addresses,
            driver: tokio::spawn(driver.run()),
        })
    }

    /// Addresses the swarm is listening on, with ports resolved.
    pub fn listen_addresses(&self) -> &[Multiaddr] {
        &self.listen_addresses
    }

    /// Gossipsub score of `peer`; `None` for peers never seen.
    pub async fn peer_score(&self, peer: &PeerId) -> Option<f64> {
        let peer = behaviour::to_libp2p(peer).ok()?;
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::PeerScore { peer, reply }).await.ok()?;
        rx.await.ok().flatten()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::Closed)?
    }
}

impl Drop for Libp2pTransport {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

#[async_trait]
impl GossipTransport for Libp2pTransport {
    fn local_peer_id(&self) -> PeerId {
        self.peer_id
    }

    async fn subscribe(&self, topic: Topic) -> Result<(), TransportError> {
        self.request(|reply| Command::Subscribe { topic, reply }).await
    }

    async fn publish(&self, topic: Topic, data: Vec<u8>) -> Result<(), TransportError> {
        self.request(|reply| Command::Publish { topic, data, reply })
            .await
    }

    async fn next_message(&self) -> Option<InboundMessage> {
        self.inbox.lock().await.recv().await
    }

    fn report_validation(&self, message: &InboundMessage, result: ValidationResult) {
        let command = Command::Report {
            id: MessageId::new(&message.id),
            result,
        };
        if let Err(e) = self.commands.try_send(command) {
            warn!(from = %message.from, topic = %message.topic, error = %e, "could not report validation result");
        }
    }

    async fn connect(&self, peer: &PeerId) -> Result<(), TransportError> {
        if self.connected.read().contains(peer) {
            return Ok(());
        }
        let target = behaviour::to_libp2p(peer)?;
        tokio::time::timeout(
            DIAL_TIMEOUT,
            self.request(|reply| Command::Dial { peer: target, reply }),
        )
        .await
        .map_err(|_| TransportError::Unreachable(*peer))?
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.connected.read().iter().copied().collect()
    }
}

fn parse_multiaddr(address: &str) -> Result<Multiaddr, TransportError> {
    address
        .parse()
        .map_err(|e| TransportError::Setup(format!("invalid address {address:?}: {e}")))
}

async fn wait_for_listeners(
    swarm: &mut Swarm<ShutterBehaviour>,
    count: usize,
) -> Result<Vec<Multiaddr>, TransportError> {
    let mut addresses = Vec::with_capacity(count);
    let listening = async {
        while addresses.len() < count {
            match swarm.select_next_some().await {
                SwarmEvent::NewListenAddr { address, .. } => addresses.push(address),
                SwarmEvent::ListenerError { error, .. } => {
                    return Err(TransportError::Setup(error.to_string()))
                }
                _ => {}
            }
        }
        Ok(())
    };
    tokio::time::timeout(LISTEN_TIMEOUT, listening)
        .await
        .map_err(|_| TransportError::Setup("timed out binding listen addresses".to_string()))??;
    Ok(addresses)
}

// =============================================================================
// DRIVER
// =============================================================================

struct Driver {
    swarm: Swarm<ShutterBehaviour>,
    commands: mpsc::Receiver<Command>,
    inbox: mpsc::Sender<InboundMessage>,
    connected: Arc<RwLock<HashSet<PeerId>>>,
    bootstrap_peers: HashSet<libp2p::PeerId>,
    namespace: kad::RecordKey,
    providing: bool,
    pending_dials: HashMap<libp2p::PeerId, Vec<Reply<()>>>,
    /// Messages awaiting validation, by id, with their propagation source.
    pending_validation: HashMap<MessageId, libp2p::PeerId>,
}

impl Driver {
    async fn run(mut self) {
        let mut discovery = tokio::time::interval(DISCOVERY_INTERVAL);
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                event = self.swarm.select_next_some() => self.on_swarm_event(event),
                _ = discovery.tick() => self.discover_peers(),
            }
        }
        debug!("libp2p driver stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Subscribe { topic, reply } => {
                let _ = reply.send(self.subscribe(topic));
            }
            Command::Publish { topic, data, reply } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(IdentTopic::new(topic.as_str()), data)
                    .map(|_| ())
                    .map_err(|e| TransportError::PublishFailed(e.to_string()));
                let _ = reply.send(result);
            }
            Command::Report { id, result } => self.report(id, result),
            Command::Dial { peer, reply } => self.dial(peer, reply),
            Command::PeerScore { peer, reply } => {
                let _ = reply.send(self.swarm.behaviour().gossipsub.peer_score(&peer));
            }
        }
    }

    fn subscribe(&mut self, topic: Topic) -> Result<(), TransportError> {
        let gossipsub = &mut self.swarm.behaviour_mut().gossipsub;
        let ident = IdentTopic::new(topic.as_str());
        gossipsub
            .subscribe(&ident)
            .map_err(|e| TransportError::Setup(format!("subscribe {topic}: {e:?}")))?;
        gossipsub
            .set_topic_params(ident, scoring::topic_score_params())
            .map_err(|e| TransportError::Setup(format!("topic score {topic}: {e}")))?;
        Ok(())
    }

    fn report(&mut self, id: MessageId, result: ValidationResult) {
        let Some(source) = self.pending_validation.remove(&id) else {
            debug!(id = %id, "validation result for unknown message");
            return;
        };
        let acceptance = match result {
            ValidationResult::Accept => MessageAcceptance::Accept,
            ValidationResult::Reject => MessageAcceptance::Reject,
            ValidationResult::Ignore => MessageAcceptance::Ignore,
        };
        if let Err(e) = self
            .swarm
            .behaviour_mut()
            .gossipsub
            .report_message_validation_result(&id, &source, acceptance)
        {
            debug!(id = %id, error = %e, "could not forward validated message");
        }
    }

    fn dial(&mut self, peer: libp2p::PeerId, reply: Reply<()>) {
        if self.swarm.is_connected(&peer) {
            let _ = reply.send(Ok(()));
            return;
        }
        let waiting = self.pending_dials.entry(peer).or_default();
        waiting.push(reply);
        if waiting.len() > 1 {
            return;
        }
        if let Err(e) = self.swarm.dial(DialOpts::peer_id(peer).build()) {
            debug!(%peer, error = %e, "dial failed");
            self.resolve_dial(&peer, false);
        }
    }

    fn resolve_dial(&mut self, peer: &libp2p::PeerId, connected: bool) {
        let Some(waiting) = self.pending_dials.remove(peer) else {
            return;
        };
        for reply in waiting {
            let result = if connected {
                Ok(())
            } else {
                Err(behaviour::from_libp2p(peer)
                    .map(TransportError::Unreachable)
                    .unwrap_or(TransportError::Closed))
            };
            let _ = reply.send(result);
        }
    }

    fn discover_peers(&mut self) {
        let peers = self.swarm.connected_peers().count();
        if peers >= PEER_TARGET {
            debug!(peers, peer_target = PEER_TARGET, "have enough peers");
            return;
        }
        debug!(peers, peer_target = PEER_TARGET, "looking for peers");
        self.swarm
            .behaviour_mut()
            .kademlia
            .get_providers(self.namespace.clone());
    }

    /// Advertise the namespace and seed the routing table once the first
    /// connection is up.
    fn start_providing(&mut self) {
        if self.providing {
            return;
        }
        self.providing = true;
        let kademlia = &mut self.swarm.behaviour_mut().kademlia;
        if let Err(e) = kademlia.start_providing(self.namespace.clone()) {
            warn!(error = %e, "could not advertise discovery namespace");
        }
        if let Err(e) = kademlia.bootstrap() {
            debug!(error = %e, "dht bootstrap skipped");
        }
    }

    fn on_swarm_event(&mut self, event: SwarmEvent<ShutterBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "listening");
            }
            SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                debug!(peer = %peer_id, address = %endpoint.get_remote_address(), "connection established");
                if let Some(peer) = behaviour::from_libp2p(&peer_id) {
                    self.connected.write().insert(peer);
                }
                if self.bootstrap_peers.contains(&peer_id) {
                    self.swarm
                        .behaviour_mut()
                        .gossipsub
                        .set_application_score(&peer_id, BOOTSTRAP_APP_SCORE);
                }
                self.resolve_dial(&peer_id, true);
                self.start_providing();
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                if num_established == 0 {
                    if let Some(peer) = behaviour::from_libp2p(&peer_id) {
                        self.connected.write().remove(&peer);
                    }
                    debug!(peer = %peer_id, "disconnected");
                }
            }
            SwarmEvent::OutgoingConnectionError {
                peer_id: Some(peer_id),
                error,
                ..
            } => {
                debug!(peer = %peer_id, error = %error, "outgoing connection failed");
                self.resolve_dial(&peer_id, false);
            }
            SwarmEvent::Behaviour(ShutterBehaviourEvent::Gossipsub(event)) => {
                self.on_gossip_event(event);
            }
            SwarmEvent::Behaviour(ShutterBehaviourEvent::Kademlia(event)) => {
                self.on_kademlia_event(event);
            }
            SwarmEvent::Behaviour(ShutterBehaviourEvent::Identify(event)) => {
                self.on_identify_event(event);
            }
            other => {
                tracing::trace!(?other, "swarm event ignored");
            }
        }
    }

    fn on_gossip_event(&mut self, event: gossipsub::Event) {
        match event {
            gossipsub::Event::Message {
                propagation_source,
                message_id,
                message,
            } => self.on_gossip_message(propagation_source, message_id, message),
            gossipsub::Event::Subscribed { peer_id, topic } => {
                debug!(peer = %peer_id, %topic, "peer subscribed");
                if self.bootstrap_peers.contains(&peer_id) {
                    self.swarm
                        .behaviour_mut()
                        .gossipsub
                        .set_application_score(&peer_id, BOOTSTRAP_APP_SCORE);
                }
            }
            _ => {}
        }
    }

    fn on_gossip_message(
        &mut self,
        propagation_source: libp2p::PeerId,
        message_id: MessageId,
        message: gossipsub::Message,
    ) {
        let topic = message.topic.as_str().parse::<Topic>().ok();
        let from = behaviour::from_libp2p(&propagation_source);
        let (Some(topic), Some(from)) = (topic, from) else {
            debug!(source = %propagation_source, topic = %message.topic, "ignoring message from unknown topic or peer");
            let _ = self.swarm.behaviour_mut().gossipsub.report_message_validation_result(
                &message_id,
                &propagation_source,
                MessageAcceptance::Ignore,
            );
            return;
        };

        let inbound = InboundMessage {
            id: message_id.0.clone(),
            topic,
            data: message.data,
            from,
        };
        match self.inbox.try_send(inbound) {
            Ok(()) => {
                self.pending_validation.insert(message_id, propagation_source);
            }
            Err(e) => {
                warn!(%topic, error = %e, "dropping gossip message");
                let _ = self.swarm.behaviour_mut().gossipsub.report_message_validation_result(
                    &message_id,
                    &propagation_source,
                    MessageAcceptance::Ignore,
                );
            }
        }
    }

    fn on_kademlia_event(&mut self, event: kad::Event) {
        let kad::Event::OutboundQueryProgressed {
            result: kad::QueryResult::GetProviders(Ok(kad::GetProvidersOk::FoundProviders { providers, .. })),
            ..
        } = event
        else {
            return;
        };
        let local = *self.swarm.local_peer_id();
        let mut new_connections = 0usize;
        for provider in providers {
            if provider == local || self.swarm.is_connected(&provider) {
                continue;
            }
            match self.swarm.dial(DialOpts::peer_id(provider).build()) {
                Ok(()) => new_connections += 1,
                Err(e) => debug!(peer = %provider, error = %e, "error dialing peer"),
            }
        }
        if new_connections > 0 {
            debug!(new_connections, "dialing discovered peers");
        }
    }

    fn on_identify_event(&mut self, event: identify::Event) {
        if let identify::Event::Received { peer_id, info, .. } = event {
            let kademlia = &mut self.swarm.behaviour_mut().kademlia;
            for address in info.listen_addrs {
                kademlia.add_address(&peer_id, address);
            }
        }
    }
}
