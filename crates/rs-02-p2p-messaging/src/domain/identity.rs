//! Node identity: an ed25519 key and the peer id derived from it.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::SigningKey;
use zeroize::Zeroizing;

use crate::domain::errors::ConfigError;

/// Peer id: the node's ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId([u8; 32]);

impl PeerId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({}..)", &hex::encode(self.0)[..12])
    }
}

impl FromStr for PeerId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut out)
            .map_err(|_| ConfigError::InvalidValue {
                field: "peer id",
                value: s.to_string(),
            })?;
        Ok(Self(out))
    }
}

/// The node's libp2p-style identity key.
#[derive(Clone)]
pub struct P2pKey {
    signing_key: SigningKey,
}

impl P2pKey {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn generate() -> Self {
        Self::from_seed(rand::random())
    }

    /// Parse a hex-encoded 32-byte seed.
    pub fn from_hex(s: &str) -> Result<Self, ConfigError> {
        let mut seed = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut seed)
            .map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
        Ok(Self::from_seed(seed))
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId(self.signing_key.verifying_key().to_bytes())
    }

    /// Raw seed, for handing the key to the network stack.
    pub fn seed(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }
}

impl fmt::Debug for P2pKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("P2pKey")
            .field("peer_id", &self.peer_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_is_stable() {
        let a = P2pKey::from_seed([3u8; 32]);
        let b = P2pKey::from_hex(&hex::encode([3u8; 32])).unwrap();
        assert_eq!(a.peer_id(), b.peer_id());
        assert_ne!(a.peer_id(), P2pKey::from_seed([4u8; 32]).peer_id());
        assert_eq!(*a.seed(), [3u8; 32]);
    }

    #[test]
    fn test_peer_id_parse() {
        let id = P2pKey::generate().peer_id();
        assert_eq!(id.to_string().parse::<PeerId>().unwrap(), id);
        assert!("zz".parse::<PeerId>().is_err());
    }
}
