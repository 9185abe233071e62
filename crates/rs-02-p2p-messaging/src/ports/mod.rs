//! # Ports Layer
//!
//! - **Driving Ports (Inbound):** validator, handler and sender traits
//! - **Driven Ports (Outbound):** the gossip transport

pub mod inbound;
pub mod outbound;

pub use inbound::{MessageHandler, MessageSender, MessageValidator};
pub use outbound::{GossipTransport, InboundMessage};
