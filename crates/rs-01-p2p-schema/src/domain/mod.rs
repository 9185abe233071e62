//! # Domain Layer - Gossip Schema
//!
//! - `messages`: the four gossip message types and the closed `P2PMessage` enum
//! - `topics`: topic names and type URLs
//! - `signing`: canonical hashes, signing and signer recovery
//! - `errors`: `SchemaError`

pub mod errors;
pub mod messages;
pub mod signing;
pub mod topics;

pub use errors::*;
pub use messages::*;
pub use topics::*;
