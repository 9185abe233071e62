//! # Rolling-Shutter Test Suite
//!
//! Cross-crate tests that run the collator and the keyper committee
//! together, on one in-memory gossip mesh or as standalone libp2p nodes.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs          # devnet configuration, user transactions
//!     ├── encrypted_mempool.rs # submit → trigger → shares → keys → batch
//!     ├── keyper_committee.rs  # trigger admission, key reconstruction
//!     └── standalone_nodes.rs  # collator and keyper runtimes over libp2p
//!
//! tests/benches/
//! └── threshold_benchmarks.rs  # share computation, aggregation, tx codec
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p rs-tests
//! cargo test -p rs-tests integration::keyper_committee::
//! cargo bench -p rs-tests
//! ```

pub mod integration;
