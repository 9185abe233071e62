//! # Node Container
//!
//! Configuration and assembly of the nodes with their ports wired to
//! adapters: the devnet on the in-memory mesh, the standalone collator and
//! keyper on libp2p.

pub mod collator;
pub mod committee;
pub mod config;
pub mod devnet;
pub mod keyper;

pub use collator::{CollatorContainer, SwarmMessaging};
pub use committee::CommitteeConfig;
pub use config::{
    CollatorNodeConfig, ConfigError, DevnetConfig, KeyperNodeConfig, NodeConfig, NodeMode,
};
pub use devnet::{CollatorNode, DevnetContainer, KeyperNode, MeshMessaging, DEVNET_EON};
pub use keyper::KeyperContainer;

use rs_02_p2p_messaging::{MessagingError, TransportError};
use rs_03_collator::CollatorError;
use rs_04_keyper::KeyperError;
use shared_crypto::CryptoError;
use thiserror::Error;

/// Errors while assembling or running the node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid p2p configuration: {0}")]
    P2pConfig(#[from] rs_02_p2p_messaging::ConfigError),

    #[error(transparent)]
    Collator(#[from] CollatorError),

    #[error(transparent)]
    Keyper(#[from] KeyperError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("{0}")]
    Task(String),
}
