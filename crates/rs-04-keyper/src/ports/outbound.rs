//! Outbound (Driven) ports for the keyper.
//!
//! | Table                  | Key                                   |
//! |------------------------|---------------------------------------|
//! | eons + DKG results     | `eon`, looked up by activation block  |
//! | `decryption_key_share` | `(eon, identity, keyper_index)`       |
//! | `decryption_key`       | `(eon, identity)`                     |

use shared_types::IdentityPreimage;

use crate::domain::{DecryptionKeyShare, DkgResult, Eon, StoreError};

/// Persisted keyper state.
///
/// Implementations make every method atomic. Inserts are idempotent: an
/// existing row is never overwritten.
pub trait KeyperStore: Send + Sync {
    /// Register an eon with its DKG result. Fails if the eon or another eon
    /// with the same activation block exists.
    fn insert_eon(&self, eon: Eon, dkg: DkgResult) -> Result<(), StoreError>;

    fn eon(&self, eon: u64) -> Option<Eon>;

    /// Eon with the largest activation block `<= block`.
    fn eon_for_block(&self, block: u64) -> Option<Eon>;

    fn dkg_result(&self, eon: u64) -> Option<DkgResult>;

    /// Insert the shares not stored yet. Returns how many were new.
    fn insert_key_shares(&self, shares: &[DecryptionKeyShare]) -> Result<usize, StoreError>;

    fn key_share_exists(&self, eon: u64, identity: &IdentityPreimage, keyper_index: u64) -> bool;

    /// Every stored share for `(eon, identity)`, ordered by keyper index.
    fn key_shares(&self, eon: u64, identity: &IdentityPreimage) -> Vec<DecryptionKeyShare>;

    /// Returns `false` if a key for `(eon, identity)` already existed.
    fn insert_decryption_key(
        &self,
        eon: u64,
        identity: &IdentityPreimage,
        key: Vec<u8>,
    ) -> Result<bool, StoreError>;

    fn decryption_key(&self, eon: u64, identity: &IdentityPreimage) -> Option<Vec<u8>>;

    /// Eons with a successful DKG whose public key was not announced yet,
    /// ordered by eon.
    fn unpublished_eons(&self) -> Vec<Eon>;

    fn mark_eon_published(&self, eon: u64) -> Result<(), StoreError>;
}
