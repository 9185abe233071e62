//! Per-key mutual exclusion.
//!
//! One logical lock per key, allocated on first use and reclaimed when no
//! holder and no waiter is left. Different keys never contend beyond the
//! short critical section on the slot table.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Slot {
    held: bool,
    waiters: usize,
}

#[derive(Debug)]
pub struct KeyedMutex<K> {
    slots: Mutex<HashMap<K, Slot>>,
    released: Condvar,
}

impl<K: Eq + Hash + Clone> Default for KeyedMutex<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            released: Condvar::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedMutex<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock for `key` is free, then take it.
    pub fn lock(&self, key: &K) -> KeyedGuard<'_, K> {
        let mut slots = self.slots.lock();
        loop {
            let slot = slots.entry(key.clone()).or_default();
            if !slot.held {
                slot.held = true;
                break;
            }
            slot.waiters += 1;
            self.released.wait(&mut slots);
            if let Some(slot) = slots.get_mut(key) {
                slot.waiters -= 1;
            }
        }
        KeyedGuard {
            owner: self,
            key: key.clone(),
        }
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unlock(&self, key: &K) {
        let mut slots = self.slots.lock();
        let reclaim = match slots.get_mut(key) {
            Some(slot) => {
                slot.held = false;
                slot.waiters == 0
            }
            None => false,
        };
        if reclaim {
            slots.remove(key);
        }
        drop(slots);
        self.released.notify_all();
    }
}

/// Releases the key's lock on drop.
pub struct KeyedGuard<'a, K: Eq + Hash + Clone> {
    owner: &'a KeyedMutex<K>,
    key: K,
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        self.owner.unlock(&self.key);
    }
}
