//! # Keyper
//!
//! Member of a threshold committee. After a DKG run each keyper holds a
//! share of the eon secret key; it releases the epoch secret key share of
//! an epoch once the collator has closed the epoch's batch, and any
//! `threshold` shares reconstruct the epoch secret key.
//!
//! ## Key Release
//!
//! | Step | Actor               | Effect                                           |
//! |------|---------------------|--------------------------------------------------|
//! | 1    | node                | `add_eon` hands over the DKG result of an eon    |
//! | 2    | `EonPublisher`      | signs and gossips the eon public key             |
//! | 3    | `TriggerHandler`    | on a collator trigger, publishes the own share   |
//! | 4    | `SharesHandler`     | stores peer shares, verified against the DKG     |
//! | 5    | `EpochKeyGenerator` | reconstructs and publishes the epoch secret key  |
//!
//! ## Domain Invariants
//!
//! | Invariant                                          | Enforcement                      |
//! |----------------------------------------------------|----------------------------------|
//! | shares are only released for collator triggers     | `service/trigger_handler.rs`     |
//! | each share and key is published at most once      | `KeyperStore` insert-if-absent   |
//! | stored peer shares verify against their key share | `service/shares_handler.rs`      |
//! | published keys verify against the eon public key  | `domain/epoch_kg.rs`             |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  adapters/ - in-memory keyper store                             │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ports/inbound.rs  - KeyperApi                                  │
//! │  ports/outbound.rs - KeyperStore                                │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  domain/dkg.rs      - DKG result, share verification           │
//! │  domain/epoch_kg.rs - epoch secret key aggregation              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use adapters::InMemoryKeyperStore;
pub use config::KeyperConfig;
pub use domain::*;
pub use ports::*;
pub use service::{
    EonKeyHandler, EonPublisher, EpochKeyGenerator, Keyper, KeyperDependencies, KeyperSettings,
    KeysHandler, SharesHandler, TriggerHandler,
};
