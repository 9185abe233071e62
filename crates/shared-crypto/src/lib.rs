//! # Shared Crypto
//!
//! Cryptographic primitives used by the collator and the keypers.
//!
//! ## Components
//!
//! | Module      | Algorithm                    | Use Case                                    |
//! |-------------|------------------------------|---------------------------------------------|
//! | `hashing`   | SHA3-256, Keccak-256         | Canonical message hashes, addresses, tx ids |
//! | `ecdsa`     | secp256k1 (recoverable)      | Trigger / eon key / transaction signatures  |
//! | `threshold` | BLS12-381 (G1 keys, G2 pks)  | Epoch secret key shares and aggregation     |
//! | `keygen`    | Shamir dealer over Fr        | Deterministic eon keys for tests / devnets  |
//!
//! ## Threshold Scheme
//!
//! ```text
//! eon secret s, shares s_i = f(i + 1), deg f = threshold - 1
//!
//!   share_i(id) = H(id) · s_i                      (G1)
//!   key(id)     = Σ λ_i · share_i(id) = H(id) · s  (Lagrange at x = 0)
//!
//!   verify share : e(share_i, g2) == e(H(id), g2 · s_i)
//!   verify key   : e(key, g2)     == e(H(id), g2 · s)
//! ```
//!
//! `H` is hash-to-G1 with the domain separation tag [`threshold::IDENTITY_DST`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod ecdsa;
pub mod errors;
pub mod hashing;
pub mod keygen;
pub mod threshold;

// Re-exports
pub use ecdsa::{recover_address, RecoverableSignature, Secp256k1KeyPair};
pub use errors::CryptoError;
pub use hashing::{hash_byte_list, keccak256, sha3_256};
pub use keygen::{DealerOutput, ThresholdKeyGen};
pub use threshold::{
    compute_epoch_secret_key, EonPublicKey, EonPublicKeyShare, EonSecretKeyShare, EpochSecretKey,
    EpochSecretKeyShare,
};
