//! # Shared Types Crate
//!
//! Primitive types shared by every Rolling-Shutter crate.
//!
//! ## Contents
//!
//! | Module       | Provides                                                        |
//! |--------------|-----------------------------------------------------------------|
//! | `primitives` | `Address`, `Hash`, `U256` and hex helpers                       |
//! | `epoch`      | `EpochId` / `IdentityPreimage`, the 32-byte batch tag           |
//! | `chain`      | `KeyperSet` and the `ChainObserver` port over L1 contract state |
//! | `retry`      | Bounded / infinite retry with exponential backoff               |
//! | `errors`     | Conversion errors for the types above                           |
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: types crossing crate boundaries live here.
//! - **Bit-exact conversions**: `EpochId` round-trips through `u64`, `U256`
//!   and raw bytes without loss, and refuses conversions that would truncate.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod chain;
pub mod epoch;
pub mod errors;
pub mod primitives;
pub mod retry;

pub use chain::{ChainObserver, InMemoryChainObserver, KeyperSet};
pub use epoch::{EpochId, IdentityPreimage};
pub use errors::TypesError;
pub use primitives::{address_from_hex, format_address, Address, Hash, U256};
pub use retry::{retry, retry_if, RetryOptions};
