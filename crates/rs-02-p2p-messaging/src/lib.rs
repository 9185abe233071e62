//! # P2P Messaging
//!
//! Typed, validated publish/subscribe for Rolling-Shutter nodes.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  MessageHandler<M>   ┌───────────────┐  GossipTransport  ┌────────────────┐
//! │  application  │ ───────────────────► │ P2PMessaging  │ ────────────────► │ libp2p swarm   │
//! │ (collator,    │ ◄─────────────────── │ (registries,  │ ◄──────────────── │ (gossipsub,    │
//! │  keyper)      │   Vec<P2PMessage>    │  envelope)    │  InboundMessage   │  kad, scoring) │
//! └───────────────┘                      └───────────────┘                   └────────────────┘
//! ```
//!
//! - Validators per topic combine as reject > ignore > accept.
//! - Handlers run only for accepted messages; their outputs are published.
//! - Peer scoring uses the network's fixed GossipSub parameters
//!   ([`adapters::swarm::scoring`]); rejected messages count against the
//!   propagating peer.
//! - Regular nodes must reach a bootstrap peer; bootstrap nodes keep trying
//!   in the background.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let plan = config.bootstrap_plan()?;
//! let transport = Arc::new(Libp2pTransport::start(&config, &plan).await?);
//! let mut messaging = P2PMessaging::new(transport, plan, tracing);
//! messaging.add_message_handler::<DecryptionTrigger, _>(handler);
//! let messaging = Arc::new(messaging);
//! messaging.run(shutdown_rx).await?;
//! ```

#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{InMemoryMesh, Libp2pTransport, MeshEndpoint};
pub use config::P2pConfig;
pub use domain::*;
pub use ports::{GossipTransport, InboundMessage, MessageHandler, MessageSender, MessageValidator};
pub use service::{bootstrap, P2PMessaging, P2PSender};
