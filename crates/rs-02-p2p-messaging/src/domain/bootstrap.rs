//! # Bootstrap Policy
//!
//! Decides, from the configured bootstrap addresses and the node's own peer
//! id, whether this node is itself a bootstrap node and which peers it has to
//! reach before joining the mesh.
//!
//! | Role               | Peers | Retry policy                                   | On failure |
//! |--------------------|-------|------------------------------------------------|------------|
//! | regular node       | ≥ 1   | 5 retries, 2 s interval                        | fatal      |
//! | bootstrap node     | ≥ 1   | infinite, 2 s growing ×1.01, capped at 60 s    | logged     |
//! | bootstrap node     | 0     | skipped                                        | -          |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use shared_types::RetryOptions;

use crate::domain::errors::ConfigError;
use crate::domain::identity::PeerId;

/// Separator between transport part and peer id in a bootstrap address.
const P2P_COMPONENT: &str = "/p2p/";

/// A bootstrap address of the form `<transport>/p2p/<peer id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAddress {
    pub transport: String,
    pub peer_id: PeerId,
}

impl FromStr for BootstrapAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidBootstrapAddress(s.to_string());
        let (transport, peer) = s.rsplit_once(P2P_COMPONENT).ok_or_else(invalid)?;
        let peer_id = peer.parse::<PeerId>().map_err(|_| invalid())?;
        Ok(Self {
            transport: transport.to_string(),
            peer_id,
        })
    }
}

impl fmt::Display for BootstrapAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.transport, P2P_COMPONENT, self.peer_id)
    }
}

/// Resolved bootstrap role and peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPlan {
    pub is_bootstrap_node: bool,
    pub peers: Vec<BootstrapAddress>,
}

impl BootstrapPlan {
    /// Split `addresses` into own entry and remote peers. A regular node
    /// without remote peers is a configuration error.
    pub fn resolve(own: PeerId, addresses: Vec<BootstrapAddress>) -> Result<Self, ConfigError> {
        let mut is_bootstrap_node = false;
        let mut peers = Vec::with_capacity(addresses.len());
        for address in addresses {
            if address.peer_id == own {
                is_bootstrap_node = true;
            } else {
                peers.push(address);
            }
        }
        if peers.is_empty() && !is_bootstrap_node {
            return Err(ConfigError::NoBootstrapPeers);
        }
        Ok(Self {
            is_bootstrap_node,
            peers,
        })
    }

    /// Retry policy for reaching the bootstrap peers, or `None` when there
    /// is nothing to reach.
    pub fn retry_options(&self) -> Option<RetryOptions> {
        if self.peers.is_empty() {
            return None;
        }
        let options = if self.is_bootstrap_node {
            RetryOptions::default()
                .infinite()
                .interval(Duration::from_secs(2))
                .exponential_backoff(1.01)
                .max_interval(Duration::from_secs(60))
        } else {
            RetryOptions::default()
                .number_of_retries(5)
                .interval(Duration::from_secs(2))
        };
        Some(options)
    }

    /// Failing to bootstrap is fatal for regular nodes only.
    pub fn failure_is_fatal(&self) -> bool {
        !self.is_bootstrap_node
    }

    pub fn peer_ids(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.iter().map(|a| a.peer_id)
    }
}
