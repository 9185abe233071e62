//! In-process sequencer for tests and the local devnet.
//!
//! Keeps one account table and executes submitted batch transactions
//! against it. A batch is all-or-nothing: it is rejected as a whole if its
//! type, chain id, batch index or signer is wrong, or if any contained
//! transaction cannot be applied. Payloads are never decrypted.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{Address, Hash, U256};
use tracing::{debug, info};

use crate::domain::{
    gas_cost, priority_fee, tx_hash, tx_type, Account, BatchTx, BlockContext, SequencerError,
    ShutterTx, BATCH_TX_TYPE, SHUTTER_TX_TYPE,
};
use crate::ports::{L1BlockSource, Sequencer, TransactionReceipt};

#[derive(Debug)]
struct Chain {
    block: BlockContext,
    accounts: HashMap<Address, Account>,
    batch_index: u64,
    l1_block_number: u64,
    receipts: HashMap<Hash, TransactionReceipt>,
    executed: Vec<BatchTx>,
    failing_submissions: u32,
}

#[derive(Debug)]
pub struct MockSequencer {
    chain_id: U256,
    collator: Address,
    chain: Mutex<Chain>,
}

impl MockSequencer {
    /// Accepts batches signed by `collator`; fees go to the collator too.
    pub fn new(chain_id: U256, collator: Address, base_fee: U256, gas_limit: u64) -> Self {
        Self {
            chain_id,
            collator,
            chain: Mutex::new(Chain {
                block: BlockContext {
                    number: 0,
                    base_fee,
                    gas_limit,
                    coinbase: collator,
                },
                accounts: HashMap::new(),
                batch_index: 0,
                l1_block_number: 0,
                receipts: HashMap::new(),
                executed: Vec::new(),
                failing_submissions: 0,
            }),
        }
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.chain.lock().accounts.entry(address).or_default().balance = balance;
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.chain.lock().accounts.entry(address).or_default().nonce = nonce;
    }

    pub fn account(&self, address: &Address) -> Account {
        self.chain.lock().accounts.get(address).copied().unwrap_or_default()
    }

    pub fn set_batch_index(&self, batch_index: u64) {
        self.chain.lock().batch_index = batch_index;
    }

    pub fn set_l1_block_number(&self, block: u64) {
        self.chain.lock().l1_block_number = block;
    }

    /// Fail the next `n` submissions with a transient RPC error.
    pub fn fail_next_submissions(&self, n: u32) {
        self.chain.lock().failing_submissions = n;
    }

    /// Batch transactions executed so far.
    pub fn executed_batches(&self) -> Vec<BatchTx> {
        self.chain.lock().executed.clone()
    }

    fn validate_batch(&self, chain: &Chain, raw: &[u8]) -> Result<BatchTx, SequencerError> {
        let kind = tx_type(raw).map_err(|e| SequencerError::Rejected(e.to_string()))?;
        if kind != BATCH_TX_TYPE {
            return Err(SequencerError::Rejected("unexpected transaction type".to_string()));
        }
        let batch = BatchTx::decode(raw).map_err(|e| SequencerError::Rejected(e.to_string()))?;
        if batch.chain_id != self.chain_id {
            return Err(SequencerError::Rejected("chain-id mismatch".to_string()));
        }
        if batch.batch_index != chain.batch_index + 1 {
            return Err(SequencerError::Rejected(
                "incorrect batch-index for next batch".to_string(),
            ));
        }
        let sender = batch
            .sender()
            .map_err(|e| SequencerError::Rejected(format!("error recovering batch tx sender: {e}")))?;
        if sender != self.collator {
            return Err(SequencerError::Rejected(
                "not signed by correct collator".to_string(),
            ));
        }
        Ok(batch)
    }

    fn apply(
        block: &BlockContext,
        accounts: &mut HashMap<Address, Account>,
        gas_used: &mut u64,
        batch_index: u64,
        raw: &[u8],
    ) -> Result<(), String> {
        if tx_type(raw).map_err(|e| e.to_string())? != SHUTTER_TX_TYPE {
            return Err("wrong transaction type".to_string());
        }
        let tx = ShutterTx::decode(raw).map_err(|e| e.to_string())?;
        let sender = tx.sender().map_err(|_| "sender not recoverable".to_string())?;
        if tx.batch_index != batch_index {
            return Err("batch-index mismatch".to_string());
        }

        let account = accounts.get(&sender).copied().unwrap_or_default();
        if tx.nonce != account.nonce {
            return Err("nonce mismatch for payload transaction".to_string());
        }
        let cost = gas_cost(&tx, block.base_fee).ok_or("gas cost overflows")?;
        if account.balance < cost {
            return Err("insufficient funds for gas fee".to_string());
        }
        if gas_used.saturating_add(tx.gas) > block.gas_limit {
            return Err("gas limit reached".to_string());
        }

        *gas_used += tx.gas;
        accounts.insert(
            sender,
            Account {
                balance: account.balance - cost,
                nonce: account.nonce + 1,
            },
        );
        let fee = priority_fee(&tx, block.base_fee).unwrap_or_default();
        let beneficiary = accounts.entry(block.coinbase).or_default();
        beneficiary.balance = beneficiary.balance.saturating_add(fee);
        Ok(())
    }
}

#[async_trait]
impl Sequencer for MockSequencer {
    async fn chain_id(&self) -> Result<U256, SequencerError> {
        Ok(self.chain_id)
    }

    async fn latest_block(&self) -> Result<BlockContext, SequencerError> {
        Ok(self.chain.lock().block)
    }

    async fn balance(&self, address: Address) -> Result<U256, SequencerError> {
        Ok(self.account(&address).balance)
    }

    async fn nonce(&self, address: Address) -> Result<u64, SequencerError> {
        Ok(self.account(&address).nonce)
    }

    async fn batch_index(&self) -> Result<u64, SequencerError> {
        Ok(self.chain.lock().batch_index)
    }

    async fn submit_batch(&self, raw: Vec<u8>) -> Result<Hash, SequencerError> {
        let mut chain = self.chain.lock();
        if chain.failing_submissions > 0 {
            chain.failing_submissions -= 1;
            return Err(SequencerError::Rpc {
                method: "shutter_submitBatch",
                reason: "connection refused".to_string(),
            });
        }

        let batch = self.validate_batch(&chain, &raw)?;

        // execute on a copy so a failing transaction leaves no trace
        let block = chain.block;
        let mut accounts = chain.accounts.clone();
        let mut gas_used = 0u64;
        for tx in &batch.transactions {
            Self::apply(&block, &mut accounts, &mut gas_used, batch.batch_index, tx)
                .map_err(|e| SequencerError::Rejected(format!("couldn't apply transaction: {e}")))?;
        }

        let hash = tx_hash(&raw);
        chain.accounts = accounts;
        chain.batch_index = batch.batch_index;
        chain.block.number += 1;
        let block_number = chain.block.number;
        chain.receipts.insert(
            hash,
            TransactionReceipt {
                tx_hash: hash,
                block_number,
                status: true,
            },
        );
        info!(
            batch_index = batch.batch_index,
            num_txs = batch.transactions.len(),
            gas_used,
            block = block_number,
            "executed batch"
        );
        chain.executed.push(batch);
        Ok(hash)
    }

    async fn transaction_receipt(
        &self,
        tx_hash: Hash,
    ) -> Result<Option<TransactionReceipt>, SequencerError> {
        let receipt = self.chain.lock().receipts.get(&tx_hash).cloned();
        debug!(tx = %hex::encode(tx_hash), found = receipt.is_some(), "receipt lookup");
        Ok(receipt)
    }
}

#[async_trait]
impl L1BlockSource for MockSequencer {
    async fn block_number(&self) -> Result<u64, SequencerError> {
        Ok(self.chain.lock().l1_block_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::Secp256k1KeyPair;

    fn collator() -> Secp256k1KeyPair {
        Secp256k1KeyPair::from_bytes([1u8; 32]).unwrap()
    }

    fn user() -> Secp256k1KeyPair {
        Secp256k1KeyPair::from_bytes([2u8; 32]).unwrap()
    }

    fn sequencer() -> MockSequencer {
        let sequencer = MockSequencer::new(U256::from(1), collator().address(), U256::one(), 210000);
        sequencer.set_balance(user().address(), U256::from(100_000));
        sequencer
    }

    fn user_tx(nonce: u64, batch_index: u64) -> Vec<u8> {
        ShutterTx {
            chain_id: U256::from(1),
            nonce,
            gas_tip_cap: U256::one(),
            gas_fee_cap: U256::from(2),
            gas: 21000,
            encrypted_payload: vec![0; 8],
            batch_index,
            signature: None,
        }
        .sign(&user())
        .unwrap()
        .encode()
        .unwrap()
    }

    fn batch(batch_index: u64, txs: Vec<Vec<u8>>, signer: &Secp256k1KeyPair) -> Vec<u8> {
        BatchTx {
            chain_id: U256::from(1),
            decryption_key: vec![1],
            batch_index,
            l1_block_number: 0,
            timestamp: 0,
            transactions: txs,
            signature: None,
        }
        .sign(signer)
        .unwrap()
        .encode()
        .unwrap()
    }

    #[tokio::test]
    async fn test_batch_executes_and_credits_collator() {
        let seq = sequencer();
        let hash = seq
            .submit_batch(batch(1, vec![user_tx(0, 1), user_tx(1, 1)], &collator()))
            .await
            .unwrap();

        assert_eq!(seq.batch_index().await.unwrap(), 1);
        assert_eq!(
            seq.account(&user().address()),
            Account {
                balance: U256::from(100_000 - 2 * 42_000),
                nonce: 2
            }
        );
        assert_eq!(seq.account(&collator().address()).balance, U256::from(42_000));
        assert!(seq.transaction_receipt(hash).await.unwrap().unwrap().status);
    }

    #[tokio::test]
    async fn test_invalid_batches_rejected() {
        let seq = sequencer();
        let stranger = Secp256k1KeyPair::from_bytes([3u8; 32]).unwrap();
        for (raw, phrase) in [
            (batch(2, vec![], &collator()), "incorrect batch-index"),
            (batch(1, vec![], &stranger), "not signed by correct collator"),
            (user_tx(0, 1), "unexpected transaction type"),
            (batch(1, vec![user_tx(5, 1)], &collator()), "nonce mismatch"),
        ] {
            let err = seq.submit_batch(raw).await.unwrap_err();
            assert!(err.to_string().contains(phrase), "{err}");
        }
        assert_eq!(seq.batch_index().await.unwrap(), 0);
        assert_eq!(seq.account(&user().address()).nonce, 0);
    }

    #[tokio::test]
    async fn test_transient_failures() {
        let seq = sequencer();
        seq.fail_next_submissions(1);
        let err = seq.submit_batch(batch(1, vec![], &collator())).await.unwrap_err();
        assert!(err.is_transient());
        seq.submit_batch(batch(1, vec![], &collator())).await.unwrap();
    }
}
