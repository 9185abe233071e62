//! In-memory [`CollatorStore`].
//!
//! All tables sit behind one `RwLock`; every trait method takes it once, so
//! each operation is atomic and `close_batch` serialises with concurrent
//! inserts.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use shared_types::{Address, EpochId, Hash};

use crate::domain::{StoreError, TxStatus};
use crate::ports::{
    BatchTxRecord, CloseBatch, CollatorStore, EonPublicKeyCandidate, NextBatch,
    StoredTransaction, TriggerRecord,
};

#[derive(Debug, Default)]
struct Tables {
    next_batch: Option<NextBatch>,
    transactions: Vec<StoredTransaction>,
    tx_index: HashMap<Hash, usize>,
    triggers: Vec<TriggerRecord>,
    batch_txs: Vec<BatchTxRecord>,
    eon_candidates: HashMap<Hash, EonPublicKeyCandidate>,
    eon_votes: HashMap<Hash, HashSet<Address>>,
}

#[derive(Debug, Default)]
pub struct InMemoryCollatorStore {
    tables: RwLock<Tables>,
}

impl InMemoryCollatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All triggers, sent or not, in insertion order.
    pub fn triggers(&self) -> Vec<TriggerRecord> {
        self.tables.read().triggers.clone()
    }

    pub fn batch_txs(&self) -> Vec<BatchTxRecord> {
        self.tables.read().batch_txs.clone()
    }

    pub fn transactions(&self) -> Vec<StoredTransaction> {
        self.tables.read().transactions.clone()
    }
}

impl CollatorStore for InMemoryCollatorStore {
    fn next_batch(&self) -> Option<NextBatch> {
        self.tables.read().next_batch
    }

    fn init_next_batch(&self, next: NextBatch) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables.next_batch.is_some() {
            return Err(StoreError::Duplicate("next batch".to_string()));
        }
        tables.next_batch = Some(next);
        Ok(())
    }

    fn insert_transaction(&self, tx: StoredTransaction) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let next = tables
            .next_batch
            .ok_or_else(|| StoreError::NotFound("next batch".to_string()))?;
        if tx.epoch_id < next.epoch_id {
            return Err(StoreError::Conflict(format!(
                "batch {} is already closed",
                tx.epoch_id
            )));
        }
        if tables.tx_index.contains_key(&tx.tx_hash) {
            return Err(StoreError::Duplicate(format!(
                "transaction 0x{}",
                hex::encode(tx.tx_hash)
            )));
        }
        let position = tables.transactions.len();
        tables.tx_index.insert(tx.tx_hash, position);
        tables.transactions.push(tx);
        Ok(())
    }

    fn transaction(&self, tx_hash: &Hash) -> Option<StoredTransaction> {
        let tables = self.tables.read();
        let position = *tables.tx_index.get(tx_hash)?;
        tables.transactions.get(position).cloned()
    }

    fn set_transaction_status(&self, tx_hash: &Hash, status: TxStatus) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let position = *tables
            .tx_index
            .get(tx_hash)
            .ok_or_else(|| StoreError::NotFound(format!("transaction 0x{}", hex::encode(tx_hash))))?;
        if let Some(tx) = tables.transactions.get_mut(position) {
            tx.status = status;
        }
        Ok(())
    }

    fn recoverable_transactions(&self) -> Vec<StoredTransaction> {
        let tables = self.tables.read();
        let Some(next) = tables.next_batch else {
            return Vec::new();
        };
        tables
            .transactions
            .iter()
            .filter(|tx| tx.status != TxStatus::Rejected && tx.epoch_id >= next.epoch_id)
            .cloned()
            .collect()
    }

    fn close_batch(&self, close: CloseBatch) -> Result<Vec<Hash>, StoreError> {
        let mut tables = self.tables.write();
        let current = tables
            .next_batch
            .ok_or_else(|| StoreError::NotFound("next batch".to_string()))?;
        if current.epoch_id != close.epoch_id {
            return Err(StoreError::Conflict(format!(
                "closing batch {} but next batch is {}",
                close.epoch_id, current.epoch_id
            )));
        }
        if close.next.epoch_id <= close.epoch_id {
            return Err(StoreError::Conflict(format!(
                "next batch {} does not follow {}",
                close.next.epoch_id, close.epoch_id
            )));
        }

        let mut rejected = Vec::new();
        for tx in tables
            .transactions
            .iter_mut()
            .filter(|tx| tx.epoch_id == close.epoch_id && tx.status == TxStatus::New)
        {
            tx.status = TxStatus::Rejected;
            rejected.push(tx.tx_hash);
        }

        let id = tables.triggers.len() as u64 + 1;
        tables.triggers.push(TriggerRecord {
            id,
            epoch_id: close.epoch_id,
            batch_hash: close.batch_hash,
            l1_block_number: close.l1_block_number,
            sent: false,
        });
        tables.next_batch = Some(close.next);
        Ok(rejected)
    }

    fn unsent_triggers(&self) -> Vec<TriggerRecord> {
        self.tables
            .read()
            .triggers
            .iter()
            .filter(|t| !t.sent)
            .cloned()
            .collect()
    }

    fn mark_trigger_sent(&self, id: u64) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let trigger = tables
            .triggers
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("trigger {id}")))?;
        trigger.sent = true;
        Ok(())
    }

    fn insert_batch_tx(&self, record: BatchTxRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if let Some(open) = tables.batch_txs.iter().find(|b| !b.submitted) {
            return Err(StoreError::Conflict(format!(
                "batch transaction for {} not submitted yet",
                open.epoch_id
            )));
        }
        tables.batch_txs.push(record);
        Ok(())
    }

    fn unsubmitted_batch_tx(&self) -> Option<BatchTxRecord> {
        self.tables
            .read()
            .batch_txs
            .iter()
            .find(|b| !b.submitted)
            .cloned()
    }

    fn mark_batch_tx_submitted(&self, epoch_id: &EpochId) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let record = tables
            .batch_txs
            .iter_mut()
            .find(|b| b.epoch_id == *epoch_id)
            .ok_or_else(|| StoreError::NotFound(format!("batch transaction {epoch_id}")))?;
        record.submitted = true;
        Ok(())
    }

    fn vote_eon_public_key(
        &self,
        candidate: EonPublicKeyCandidate,
        voter: Address,
        threshold: u64,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write();
        let hash = candidate.hash;
        tables.eon_candidates.entry(hash).or_insert(EonPublicKeyCandidate {
            confirmed: false,
            ..candidate
        });
        let votes = tables.eon_votes.entry(hash).or_default();
        votes.insert(voter);
        let count = votes.len() as u64;

        let Some(stored) = tables.eon_candidates.get_mut(&hash) else {
            return Err(StoreError::NotFound("eon public key candidate".to_string()));
        };
        if stored.confirmed || count < threshold {
            return Ok(false);
        }
        stored.confirmed = true;
        Ok(true)
    }

    fn confirmed_eon_public_key(&self, eon: u64) -> Option<EonPublicKeyCandidate> {
        self.tables
            .read()
            .eon_candidates
            .values()
            .find(|c| c.confirmed && c.eon == eon)
            .cloned()
    }

    fn confirmed_eon_public_key_for_block(&self, block: u64) -> Option<EonPublicKeyCandidate> {
        self.tables
            .read()
            .eon_candidates
            .values()
            .filter(|c| c.confirmed && c.activation_block <= block)
            .max_by_key(|c| (c.activation_block, c.eon))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch(n: u64) -> EpochId {
        EpochId::from_u64(n)
    }

    fn store_at(n: u64) -> InMemoryCollatorStore {
        let store = InMemoryCollatorStore::new();
        store
            .init_next_batch(NextBatch {
                epoch_id: epoch(n),
                l1_block_number: 10,
            })
            .unwrap();
        store
    }

    fn stored(hash: u8, n: u64) -> StoredTransaction {
        StoredTransaction {
            tx_hash: [hash; 32],
            epoch_id: epoch(n),
            tx_bytes: vec![hash],
            status: TxStatus::New,
        }
    }

    fn candidate(eon: u64, activation_block: u64) -> EonPublicKeyCandidate {
        EonPublicKeyCandidate {
            hash: [eon as u8; 32],
            eon_public_key: vec![1, 2, 3],
            activation_block,
            keyper_config_index: 1,
            eon,
            confirmed: false,
        }
    }

    #[test]
    fn test_insert_rejects_closed_epoch_and_duplicates() {
        let store = store_at(2);
        assert!(matches!(
            store.insert_transaction(stored(1, 1)),
            Err(StoreError::Conflict(_))
        ));
        store.insert_transaction(stored(1, 2)).unwrap();
        assert!(matches!(
            store.insert_transaction(stored(1, 3)),
            Err(StoreError::Duplicate(_))
        ));
    }

    #[test]
    fn test_close_batch_rejects_new_and_advances() {
        let store = store_at(1);
        store.insert_transaction(stored(1, 1)).unwrap();
        store.insert_transaction(stored(2, 1)).unwrap();
        store.insert_transaction(stored(3, 2)).unwrap();
        store.set_transaction_status(&[2; 32], TxStatus::Committed).unwrap();

        let rejected = store
            .close_batch(CloseBatch {
                epoch_id: epoch(1),
                batch_hash: [9; 32],
                l1_block_number: 10,
                next: NextBatch {
                    epoch_id: epoch(2),
                    l1_block_number: 12,
                },
            })
            .unwrap();
        assert_eq!(rejected, vec![[1; 32]]);
        assert_eq!(store.next_batch().unwrap().epoch_id, epoch(2));
        assert_eq!(store.unsent_triggers().len(), 1);
        // only the epoch-2 transaction is left to recover
        assert_eq!(store.recoverable_transactions(), vec![stored(3, 2)]);

        // closing the same batch twice fails
        assert!(store
            .close_batch(CloseBatch {
                epoch_id: epoch(1),
                batch_hash: [9; 32],
                l1_block_number: 10,
                next: NextBatch {
                    epoch_id: epoch(2),
                    l1_block_number: 12,
                },
            })
            .is_err());
    }

    #[test]
    fn test_single_unsubmitted_batch_tx() {
        let store = store_at(1);
        let record = |n| BatchTxRecord {
            epoch_id: epoch(n),
            marshalled: vec![n as u8],
            submitted: false,
        };
        store.insert_batch_tx(record(1)).unwrap();
        assert!(store.insert_batch_tx(record(2)).is_err());
        store.mark_batch_tx_submitted(&epoch(1)).unwrap();
        store.insert_batch_tx(record(2)).unwrap();
        assert_eq!(store.unsubmitted_batch_tx().unwrap().epoch_id, epoch(2));
    }

    #[test]
    fn test_eon_key_confirmed_at_threshold() {
        let store = store_at(1);
        assert!(!store.vote_eon_public_key(candidate(1, 5), [1; 20], 2).unwrap());
        // same voter twice does not count
        assert!(!store.vote_eon_public_key(candidate(1, 5), [1; 20], 2).unwrap());
        assert!(store.confirmed_eon_public_key(1).is_none());
        assert!(store.vote_eon_public_key(candidate(1, 5), [2; 20], 2).unwrap());
        assert!(!store.vote_eon_public_key(candidate(1, 5), [3; 20], 2).unwrap());

        assert!(store.confirmed_eon_public_key(1).unwrap().confirmed);
        assert!(store.confirmed_eon_public_key_for_block(4).is_none());
        assert_eq!(store.confirmed_eon_public_key_for_block(5).unwrap().eon, 1);

        store.vote_eon_public_key(candidate(2, 50), [1; 20], 1).unwrap();
        assert_eq!(store.confirmed_eon_public_key_for_block(49).unwrap().eon, 1);
        assert_eq!(store.confirmed_eon_public_key_for_block(60).unwrap().eon, 2);
    }
}
