//! Gossip message types.
//!
//! Byte fields that carry group elements or signatures stay as raw bytes on
//! the wire; accessors parse them on demand so that a malformed element is
//! reported where it is used.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared_crypto::{EpochSecretKey, EpochSecretKeyShare, RecoverableSignature};
use shared_types::{EpochId, Hash, IdentityPreimage};

use crate::domain::errors::SchemaError;
use crate::domain::topics::Topic;

/// Collator announcement that a batch is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionTrigger {
    pub instance_id: u64,
    pub epoch_id: EpochId,
    pub block_number: u64,
    pub transactions_hash: Hash,
    pub signature: Vec<u8>,
}

/// One epoch secret key share inside [`DecryptionKeyShares`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShare {
    pub epoch_id: EpochId,
    pub share: Vec<u8>,
}

impl KeyShare {
    pub fn epoch_secret_key_share(&self) -> Result<EpochSecretKeyShare, SchemaError> {
        Ok(EpochSecretKeyShare::from_slice(&self.share)?)
    }
}

/// Shares of one keyper for one or more epochs of an eon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionKeyShares {
    pub instance_id: u64,
    pub eon: u64,
    pub keyper_index: u64,
    pub shares: Vec<KeyShare>,
}

/// One epoch secret key inside [`DecryptionKeys`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub identity: IdentityPreimage,
    pub key: Vec<u8>,
}

impl Key {
    pub fn epoch_secret_key(&self) -> Result<EpochSecretKey, SchemaError> {
        Ok(EpochSecretKey::from_slice(&self.key)?)
    }
}

/// Reconstructed epoch secret keys of an eon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionKeys {
    pub instance_id: u64,
    pub eon: u64,
    pub keys: Vec<Key>,
}

/// A keyper's signed vote for the public key of an eon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EonPublicKey {
    pub instance_id: u64,
    pub public_key: Vec<u8>,
    pub activation_block: u64,
    pub keyper_config_index: u64,
    pub eon: u64,
    pub keyper_index: u64,
    pub signature: Vec<u8>,
}

// =============================================================================
// MESSAGE TRAIT
// =============================================================================

/// A type that travels on exactly one gossip topic.
pub trait Message:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    /// Topic this type is published on.
    const TOPIC: Topic;

    /// Instance id the message is bound to.
    fn instance_id(&self) -> u64;

    /// Short description for logs.
    fn log_info(&self) -> String;

    /// Structural checks run right after decoding.
    fn validate(&self) -> Result<(), SchemaError> {
        Ok(())
    }

    /// Wrap into the closed message enum.
    fn into_p2p(self) -> P2PMessage;

    /// Unwrap from the closed message enum.
    fn from_p2p(message: P2PMessage) -> Option<Self>;
}

fn check_signature_len(signature: &[u8]) -> Result<(), SchemaError> {
    if signature.len() != RecoverableSignature::LEN {
        return Err(SchemaError::InvalidMessage(format!(
            "signature has {} bytes",
            signature.len()
        )));
    }
    Ok(())
}

impl Message for DecryptionTrigger {
    const TOPIC: Topic = Topic::DecryptionTrigger;

    fn instance_id(&self) -> u64 {
        self.instance_id
    }

    fn log_info(&self) -> String {
        format!(
            "DecryptionTrigger{{epochid={}, block={}}}",
            self.epoch_id, self.block_number
        )
    }

    fn validate(&self) -> Result<(), SchemaError> {
        check_signature_len(&self.signature)
    }

    fn into_p2p(self) -> P2PMessage {
        P2PMessage::DecryptionTrigger(self)
    }

    fn from_p2p(message: P2PMessage) -> Option<Self> {
        match message {
            P2PMessage::DecryptionTrigger(m) => Some(m),
            _ => None,
        }
    }
}

impl Message for DecryptionKeyShares {
    const TOPIC: Topic = Topic::DecryptionKeyShares;

    fn instance_id(&self) -> u64 {
        self.instance_id
    }

    fn log_info(&self) -> String {
        let first = self.shares.first().map(|s| s.epoch_id.to_string());
        format!(
            "DecryptionKeyShares{{eon={}, keyperIndex={}, shares={}, first={}}}",
            self.eon,
            self.keyper_index,
            self.shares.len(),
            first.unwrap_or_default()
        )
    }

    fn validate(&self) -> Result<(), SchemaError> {
        for share in &self.shares {
            share.epoch_secret_key_share()?;
        }
        Ok(())
    }

    fn into_p2p(self) -> P2PMessage {
        P2PMessage::DecryptionKeyShares(self)
    }

    fn from_p2p(message: P2PMessage) -> Option<Self> {
        match message {
            P2PMessage::DecryptionKeyShares(m) => Some(m),
            _ => None,
        }
    }
}

impl Message for DecryptionKeys {
    const TOPIC: Topic = Topic::DecryptionKeys;

    fn instance_id(&self) -> u64 {
        self.instance_id
    }

    fn log_info(&self) -> String {
        let first = self.keys.first().map(|k| k.identity.to_string());
        format!(
            "DecryptionKeys{{eon={}, keys={}, first={}}}",
            self.eon,
            self.keys.len(),
            first.unwrap_or_default()
        )
    }

    fn validate(&self) -> Result<(), SchemaError> {
        for key in &self.keys {
            key.epoch_secret_key()?;
        }
        Ok(())
    }

    fn into_p2p(self) -> P2PMessage {
        P2PMessage::DecryptionKeys(self)
    }

    fn from_p2p(message: P2PMessage) -> Option<Self> {
        match message {
            P2PMessage::DecryptionKeys(m) => Some(m),
            _ => None,
        }
    }
}

impl Message for EonPublicKey {
    const TOPIC: Topic = Topic::EonPublicKey;

    fn instance_id(&self) -> u64 {
        self.instance_id
    }

    fn log_info(&self) -> String {
        format!(
            "EonPublicKey{{eon={}, activationBlock={}, keyperIndex={}}}",
            self.eon, self.activation_block, self.keyper_index
        )
    }

    fn validate(&self) -> Result<(), SchemaError> {
        check_signature_len(&self.signature)
    }

    fn into_p2p(self) -> P2PMessage {
        P2PMessage::EonPublicKey(self)
    }

    fn from_p2p(message: P2PMessage) -> Option<Self> {
        match message {
            P2PMessage::EonPublicKey(m) => Some(m),
            _ => None,
        }
    }
}

// =============================================================================
// CLOSED MESSAGE ENUM
// =============================================================================

/// Any gossip message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum P2PMessage {
    DecryptionTrigger(DecryptionTrigger),
    DecryptionKeyShares(DecryptionKeyShares),
    DecryptionKeys(DecryptionKeys),
    EonPublicKey(EonPublicKey),
}

impl P2PMessage {
    pub fn topic(&self) -> Topic {
        match self {
            P2PMessage::DecryptionTrigger(_) => Topic::DecryptionTrigger,
            P2PMessage::DecryptionKeyShares(_) => Topic::DecryptionKeyShares,
            P2PMessage::DecryptionKeys(_) => Topic::DecryptionKeys,
            P2PMessage::EonPublicKey(_) => Topic::EonPublicKey,
        }
    }

    pub fn instance_id(&self) -> u64 {
        match self {
            P2PMessage::DecryptionTrigger(m) => m.instance_id(),
            P2PMessage::DecryptionKeyShares(m) => m.instance_id(),
            P2PMessage::DecryptionKeys(m) => m.instance_id(),
            P2PMessage::EonPublicKey(m) => m.instance_id(),
        }
    }

    pub fn log_info(&self) -> String {
        match self {
            P2PMessage::DecryptionTrigger(m) => m.log_info(),
            P2PMessage::DecryptionKeyShares(m) => m.log_info(),
            P2PMessage::DecryptionKeys(m) => m.log_info(),
            P2PMessage::EonPublicKey(m) => m.log_info(),
        }
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        match self {
            P2PMessage::DecryptionTrigger(m) => m.validate(),
            P2PMessage::DecryptionKeyShares(m) => m.validate(),
            P2PMessage::DecryptionKeys(m) => m.validate(),
            P2PMessage::EonPublicKey(m) => m.validate(),
        }
    }

    pub(crate) fn encode_value(&self) -> Result<Vec<u8>, SchemaError> {
        let bytes = match self {
            P2PMessage::DecryptionTrigger(m) => bincode::serialize(m)?,
            P2PMessage::DecryptionKeyShares(m) => bincode::serialize(m)?,
            P2PMessage::DecryptionKeys(m) => bincode::serialize(m)?,
            P2PMessage::EonPublicKey(m) => bincode::serialize(m)?,
        };
        Ok(bytes)
    }

    pub(crate) fn decode_value(topic: Topic, value: &[u8]) -> Result<Self, SchemaError> {
        let message = match topic {
            Topic::DecryptionTrigger => {
                P2PMessage::DecryptionTrigger(bincode::deserialize(value)?)
            }
            Topic::DecryptionKeyShares => {
                P2PMessage::DecryptionKeyShares(bincode::deserialize(value)?)
            }
            Topic::DecryptionKeys => P2PMessage::DecryptionKeys(bincode::deserialize(value)?),
            Topic::EonPublicKey => P2PMessage::EonPublicKey(bincode::deserialize(value)?),
        };
        Ok(message)
    }
}
