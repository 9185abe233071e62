//! # Chain Observer
//!
//! The collator and keypers consume a small projection of L1 contract state:
//! the sequence of keyper sets (one per keyper config index) and the collator
//! registered for a block range. Syncing that state from L1 is not part of
//! this workspace; it is exposed through the [`ChainObserver`] port.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::primitives::Address;

/// A keyper set as registered on L1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyperSet {
    /// Keyper config index.
    pub index: u64,
    /// First L1 block at which this set is active.
    pub activation_block: u64,
    /// Keyper addresses; position is the keyper index.
    pub keypers: Vec<Address>,
    /// Number of shares needed to reconstruct a key.
    pub threshold: u64,
}

impl KeyperSet {
    /// Position of `address` in the set, if present.
    pub fn keyper_index(&self, address: &Address) -> Option<u64> {
        self.keypers
            .iter()
            .position(|a| a == address)
            .map(|i| i as u64)
    }

    /// Whether `address` belongs to the set.
    pub fn contains(&self, address: &Address) -> bool {
        self.keyper_index(address).is_some()
    }

    /// Address at `index`, if in bounds.
    pub fn keyper_at(&self, index: u64) -> Option<&Address> {
        usize::try_from(index).ok().and_then(|i| self.keypers.get(i))
    }
}

/// Read access to synced L1 state.
pub trait ChainObserver: Send + Sync {
    /// Keyper set by config index.
    fn keyper_set(&self, config_index: u64) -> Option<KeyperSet>;

    /// Keyper set active at `block` (largest activation block ≤ `block`).
    fn keyper_set_for_block(&self, block: u64) -> Option<KeyperSet>;

    /// Collator registered for `block` (largest activation block ≤ `block`).
    fn collator_for_block(&self, block: u64) -> Option<Address>;
}

/// In-memory chain observer used by tests and the local devnet.
#[derive(Debug, Default)]
pub struct InMemoryChainObserver {
    keyper_sets: RwLock<BTreeMap<u64, KeyperSet>>,
    collators: RwLock<BTreeMap<u64, Address>>,
}

impl InMemoryChainObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a keyper set under its config index.
    pub fn add_keyper_set(&self, set: KeyperSet) {
        self.keyper_sets.write().insert(set.index, set);
    }

    /// Register `collator` as active from `activation_block` on.
    pub fn add_collator(&self, activation_block: u64, collator: Address) {
        self.collators.write().insert(activation_block, collator);
    }
}

impl ChainObserver for InMemoryChainObserver {
    fn keyper_set(&self, config_index: u64) -> Option<KeyperSet> {
        self.keyper_sets.read().get(&config_index).cloned()
    }

    fn keyper_set_for_block(&self, block: u64) -> Option<KeyperSet> {
        self.keyper_sets
            .read()
            .values()
            .filter(|s| s.activation_block <= block)
            .max_by_key(|s| s.activation_block)
            .cloned()
    }

    fn collator_for_block(&self, block: u64) -> Option<Address> {
        self.collators
            .read()
            .range(..=block)
            .next_back()
            .map(|(_, a)| *a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(index: u64, activation_block: u64) -> KeyperSet {
        KeyperSet {
            index,
            activation_block,
            keypers: vec![[1u8; 20], [2u8; 20], [3u8; 20]],
            threshold: 2,
        }
    }

    #[test]
    fn test_keyper_index_lookup() {
        let s = set(0, 0);
        assert_eq!(s.keyper_index(&[2u8; 20]), Some(1));
        assert_eq!(s.keyper_index(&[9u8; 20]), None);
        assert_eq!(s.keyper_at(2), Some(&[3u8; 20]));
        assert_eq!(s.keyper_at(3), None);
    }

    #[test]
    fn test_keyper_set_for_block_picks_latest_active() {
        let observer = InMemoryChainObserver::new();
        observer.add_keyper_set(set(0, 10));
        observer.add_keyper_set(set(1, 100));

        assert!(observer.keyper_set_for_block(5).is_none());
        assert_eq!(observer.keyper_set_for_block(50).unwrap().index, 0);
        assert_eq!(observer.keyper_set_for_block(100).unwrap().index, 1);
    }

    #[test]
    fn test_collator_for_block() {
        let observer = InMemoryChainObserver::new();
        observer.add_collator(5, [7u8; 20]);
        observer.add_collator(20, [8u8; 20]);

        assert_eq!(observer.collator_for_block(4), None);
        assert_eq!(observer.collator_for_block(5), Some([7u8; 20]));
        assert_eq!(observer.collator_for_block(19), Some([7u8; 20]));
        assert_eq!(observer.collator_for_block(25), Some([8u8; 20]));
    }
}
