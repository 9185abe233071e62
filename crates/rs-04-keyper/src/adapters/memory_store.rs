//! In-memory [`KeyperStore`] guarded by one `RwLock`.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::RwLock;
use shared_types::IdentityPreimage;

use crate::domain::{DecryptionKeyShare, DkgResult, Eon, StoreError};
use crate::ports::KeyperStore;

#[derive(Debug, Default)]
struct Tables {
    eons: BTreeMap<u64, Eon>,
    /// activation block -> eon
    activations: BTreeMap<u64, u64>,
    dkg_results: HashMap<u64, DkgResult>,
    published: HashSet<u64>,
    shares: BTreeMap<(u64, IdentityPreimage, u64), Vec<u8>>,
    keys: HashMap<(u64, IdentityPreimage), Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct InMemoryKeyperStore {
    tables: RwLock<Tables>,
}

impl InMemoryKeyperStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn share_count(&self) -> usize {
        self.tables.read().shares.len()
    }

    pub fn key_count(&self) -> usize {
        self.tables.read().keys.len()
    }
}

impl KeyperStore for InMemoryKeyperStore {
    fn insert_eon(&self, eon: Eon, dkg: DkgResult) -> Result<(), StoreError> {
        if dkg.eon() != eon.eon {
            return Err(StoreError::Conflict(format!(
                "DKG result for eon {} stored under eon {}",
                dkg.eon(),
                eon.eon
            )));
        }
        let mut tables = self.tables.write();
        if tables.eons.contains_key(&eon.eon) {
            return Err(StoreError::Conflict(format!("eon {} already exists", eon.eon)));
        }
        if let Some(existing) = tables.activations.get(&eon.activation_block) {
            return Err(StoreError::Conflict(format!(
                "eon {existing} already activates at block {}",
                eon.activation_block
            )));
        }
        tables.activations.insert(eon.activation_block, eon.eon);
        tables.eons.insert(eon.eon, eon);
        tables.dkg_results.insert(eon.eon, dkg);
        Ok(())
    }

    fn eon(&self, eon: u64) -> Option<Eon> {
        self.tables.read().eons.get(&eon).copied()
    }

    fn eon_for_block(&self, block: u64) -> Option<Eon> {
        let tables = self.tables.read();
        tables
            .activations
            .range(..=block)
            .next_back()
            .and_then(|(_, eon)| tables.eons.get(eon).copied())
    }

    fn dkg_result(&self, eon: u64) -> Option<DkgResult> {
        self.tables.read().dkg_results.get(&eon).cloned()
    }

    fn insert_key_shares(&self, shares: &[DecryptionKeyShare]) -> Result<usize, StoreError> {
        let mut tables = self.tables.write();
        let mut inserted = 0;
        for share in shares {
            let key = (share.eon, share.identity, share.keyper_index);
            if !tables.shares.contains_key(&key) {
                tables.shares.insert(key, share.share.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn key_share_exists(&self, eon: u64, identity: &IdentityPreimage, keyper_index: u64) -> bool {
        self.tables
            .read()
            .shares
            .contains_key(&(eon, *identity, keyper_index))
    }

    fn key_shares(&self, eon: u64, identity: &IdentityPreimage) -> Vec<DecryptionKeyShare> {
        self.tables
            .read()
            .shares
            .range((eon, *identity, 0)..=(eon, *identity, u64::MAX))
            .map(|((eon, identity, keyper_index), share)| DecryptionKeyShare {
                eon: *eon,
                identity: *identity,
                keyper_index: *keyper_index,
                share: share.clone(),
            })
            .collect()
    }

    fn insert_decryption_key(
        &self,
        eon: u64,
        identity: &IdentityPreimage,
        key: Vec<u8>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write();
        if tables.keys.contains_key(&(eon, *identity)) {
            return Ok(false);
        }
        tables.keys.insert((eon, *identity), key);
        Ok(true)
    }

    fn decryption_key(&self, eon: u64, identity: &IdentityPreimage) -> Option<Vec<u8>> {
        self.tables.read().keys.get(&(eon, *identity)).cloned()
    }

    fn unpublished_eons(&self) -> Vec<Eon> {
        let tables = self.tables.read();
        tables
            .eons
            .values()
            .filter(|eon| !tables.published.contains(&eon.eon))
            .filter(|eon| {
                tables
                    .dkg_results
                    .get(&eon.eon)
                    .is_some_and(|dkg| dkg.success().is_some())
            })
            .copied()
            .collect()
    }

    fn mark_eon_published(&self, eon: u64) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if !tables.eons.contains_key(&eon) {
            return Err(StoreError::NotFound(format!("eon {eon}")));
        }
        tables.published.insert(eon);
        Ok(())
    }
}
