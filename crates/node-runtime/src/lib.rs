//! # Shutter Node Runtime
//!
//! Runs one of three modes:
//!
//! | Mode       | Transport       | Sequencer                 | Eon source       |
//! |------------|-----------------|---------------------------|------------------|
//! | `devnet`   | in-memory mesh  | in-process mock           | trusted dealer   |
//! | `collator` | libp2p          | JSON-RPC `sequencer_url`  | keyper votes     |
//! | `keyper`   | libp2p          | none                      | trusted dealer   |
//!
//! The devnet runs a collator, a keyper committee and a mock sequencer in
//! one process. The standalone modes share a committee configuration so
//! that separately started nodes agree on the keyper set and the collator.
//!
//! ## Modules
//!
//! - `container/` - configuration and node assembly
//! - `runtime`    - task lifecycle
//!
//! ```text
//!   users ──rpc──► collator ──trigger──► keypers ──shares──► keypers
//!                     ▲                                          │
//!                     └─────────────── keys ◄────────────────────┘
//!                     │
//!                     └──► sequencer
//! ```

#![warn(clippy::all)]

pub mod container;
pub mod runtime;

pub use container::{
    CollatorContainer, CollatorNodeConfig, CommitteeConfig, ConfigError, DevnetConfig,
    DevnetContainer, KeyperContainer, KeyperNodeConfig, NodeConfig, NodeError, NodeMode,
};
pub use runtime::{CollatorRuntime, KeyperRuntime, NodeRuntime, TaskSet};
