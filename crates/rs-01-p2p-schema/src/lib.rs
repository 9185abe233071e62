//! # Signed Gossip Schema
//!
//! Message types exchanged between the collator and the keypers, the topics
//! they travel on, and the versioned envelope they are wrapped in.
//!
//! ## Topics
//!
//! | Topic                 | Message               | Producer | Signed |
//! |-----------------------|-----------------------|----------|--------|
//! | `decryptionTrigger`   | `DecryptionTrigger`   | collator | ECDSA  |
//! | `decryptionKeyShares` | `DecryptionKeyShares` | keyper   | -      |
//! | `decryptionKeys`      | `DecryptionKeys`      | keyper   | -      |
//! | `eonPublicKey`        | `EonPublicKey`        | keyper   | ECDSA  |
//!
//! Shares and keys carry no signature: they are checked against the eon's
//! public key shares and public key by pairing.
//!
//! ## Example
//!
//! ```rust,ignore
//! let trigger = DecryptionTrigger::new_signed(instance_id, epoch_id, block, tx_hash, &key)?;
//! let bytes = envelope::marshal(&trigger.into_p2p(), None)?;
//! let received = envelope::unmarshal("decryptionTrigger", &bytes, &tracing)?;
//! ```

#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod envelope;

pub use domain::*;
pub use envelope::{marshal, unmarshal, Any, Envelope, Received, TraceContext, ENVELOPE_VERSION};
