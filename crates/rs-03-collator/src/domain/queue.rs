//! Append-only queue of the transactions committed to one batch.

use std::collections::HashSet;

use shared_crypto::hash_byte_list;
use shared_types::{Address, Hash};

use crate::domain::pending::PendingTransaction;

#[derive(Debug, Default)]
pub struct TransactionQueue {
    transactions: Vec<PendingTransaction>,
    senders: HashSet<Address>,
    total_size: usize,
}

impl TransactionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, tx: PendingTransaction) {
        self.senders.insert(tx.sender);
        self.total_size += tx.size();
        self.transactions.push(tx);
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Raw transaction bytes in insertion order.
    pub fn bytes(&self) -> Vec<Vec<u8>> {
        self.transactions.iter().map(|t| t.raw.clone()).collect()
    }

    pub fn tx_hashes(&self) -> Vec<Hash> {
        self.transactions.iter().map(|t| t.hash).collect()
    }

    /// `sha3_256(concat_i sha3_256(tx_hash_i))` over the queued transactions.
    pub fn hash(&self) -> Hash {
        hash_byte_list(self.transactions.iter().map(|t| t.hash))
    }

    pub fn senders(&self) -> &HashSet<Address> {
        &self.senders
    }

    /// Sum of the raw transaction sizes.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Take every transaction out, e.g. to resolve their result channels.
    pub fn drain(&mut self) -> Vec<PendingTransaction> {
        self.senders.clear();
        self.total_size = 0;
        std::mem::take(&mut self.transactions)
    }
}
