//! # Collator
//!
//! Orders encrypted transactions into per-epoch batches, announces closed
//! batches to the keypers and submits decrypted batches to the sequencer.
//!
//! ## Batch Lifecycle
//!
//! | Step | Actor            | Effect                                                 |
//! |------|------------------|--------------------------------------------------------|
//! | 1    | user             | submits a signed `ShutterTx` for batch index `B`       |
//! | 2    | `BatchHandler`   | admits it if `N <= B <= N + interval` and it applies   |
//! | 3    | epoch ticker     | closes batch `N`, stores a trigger, advances to `N+1`  |
//! | 4    | `TriggerSender`  | signs and gossips the `DecryptionTrigger`              |
//! | 5    | `KeysHandler`    | verifies the keypers' epoch secret key                 |
//! | 6    | batch task       | builds the signed `BatchTx`                            |
//! | 7    | `BatchSubmitter` | submits it and waits for the receipt                   |
//!
//! ## Domain Invariants
//!
//! | Invariant                                         | Enforcement                        |
//! |---------------------------------------------------|------------------------------------|
//! | triggers are published in epoch order            | `service/trigger_sender.rs`        |
//! | a batch closes only after its predecessor did    | `service/batch_runner.rs`          |
//! | at most one unsubmitted batch transaction        | `CollatorStore::insert_batch_tx`   |
//! | no batch closes without a confirmed eon key      | `service/batch_runner.rs`          |
//! | every admitted transaction resolves exactly once | `domain/pending.rs`                |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  adapters/ - JSON-RPC sequencer and server, mock, memory store  │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ports/inbound.rs  - CollatorApi                                │
//! │  ports/outbound.rs - Sequencer, L1BlockSource, CollatorStore    │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  domain/transaction.rs - ShutterTx / BatchTx codec              │
//! │  domain/chain_state.rs - balance and nonce cache, gas rules     │
//! │  domain/batch.rs       - per-epoch state machine                │
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

pub use adapters::{start_rpc_server, InMemoryCollatorStore, JsonRpcSequencer, MockSequencer};
pub use config::CollatorConfig;
pub use domain::*;
pub use ports::*;
pub use service::{
    BatchHandler, BatchSubmitter, Collator, CollatorDependencies, CollatorSettings,
    EonKeyHandler, KeysHandler, SubmissionOutcome, TriggerSender, Wakeups,
};
