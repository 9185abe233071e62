//! Gossip topics. One message type per topic.

use std::fmt;
use std::str::FromStr;

use crate::domain::errors::SchemaError;

/// Gossip topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    /// Collator → keypers.
    DecryptionTrigger,
    /// Keyper → keypers.
    DecryptionKeyShares,
    /// Keyper → keypers, collator.
    DecryptionKeys,
    /// Keyper → collator.
    EonPublicKey,
}

impl Topic {
    /// All topics, in a stable order.
    pub const ALL: [Topic; 4] = [
        Topic::DecryptionTrigger,
        Topic::DecryptionKeyShares,
        Topic::DecryptionKeys,
        Topic::EonPublicKey,
    ];

    /// Wire name of the topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::DecryptionTrigger => "decryptionTrigger",
            Topic::DecryptionKeyShares => "decryptionKeyShares",
            Topic::DecryptionKeys => "decryptionKeys",
            Topic::EonPublicKey => "eonPublicKey",
        }
    }

    /// Type URL of the message carried on this topic.
    pub fn type_url(&self) -> &'static str {
        match self {
            Topic::DecryptionTrigger => "shutter.p2p.DecryptionTrigger",
            Topic::DecryptionKeyShares => "shutter.p2p.DecryptionKeyShares",
            Topic::DecryptionKeys => "shutter.p2p.DecryptionKeys",
            Topic::EonPublicKey => "shutter.p2p.EonPublicKey",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SchemaError::UnknownTopic(s.to_string()))
    }
}
