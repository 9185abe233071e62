//! Pending transactions and their single-shot result.
//!
//! The sender half of the result channel lives inside [`PendingTransaction`]
//! and is consumed by [`PendingTransaction::resolve`], so a transaction can be
//! resolved at most once. Dropping an unresolved transaction closes the
//! channel; the receiver then reports [`TxRejection::Unavailable`].

use std::time::Instant;

use shared_types::{Address, EpochId, Hash};
use tokio::sync::oneshot;

use crate::domain::errors::{CodecError, TxRejection};
use crate::domain::transaction::{tx_hash, ShutterTx};

/// Final outcome of a submitted transaction.
pub type TxResult = Result<(), TxRejection>;

/// Receiver half handed to the submitter.
#[derive(Debug)]
pub struct TxResultReceiver(oneshot::Receiver<TxResult>);

impl TxResultReceiver {
    /// A receiver that is already resolved.
    pub fn resolved(result: TxResult) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self(rx)
    }

    /// Wait for the outcome.
    pub async fn wait(self) -> TxResult {
        self.0
            .await
            .unwrap_or_else(|_| Err(TxRejection::Unavailable("transaction dropped".to_string())))
    }

    /// Non-blocking poll. `None` while the transaction is still in flight.
    pub fn try_result(&mut self) -> Option<TxResult> {
        match self.0.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TxRejection::Unavailable(
                "transaction dropped".to_string(),
            ))),
        }
    }
}

/// A decoded user transaction on its way into a batch.
#[derive(Debug)]
pub struct PendingTransaction {
    pub tx: ShutterTx,
    pub raw: Vec<u8>,
    pub hash: Hash,
    pub sender: Address,
    pub received_at: Instant,
    /// Already persisted as committed (set during recovery).
    pub committed: bool,
    result: Option<oneshot::Sender<TxResult>>,
}

impl PendingTransaction {
    /// Decode and recover the sender. Returns the transaction and the receiver
    /// for its outcome.
    pub fn new(raw: Vec<u8>) -> Result<(Self, TxResultReceiver), CodecError> {
        let tx = ShutterTx::decode(&raw)?;
        let sender = tx.sender()?;
        Ok(Self::from_parts(tx, raw, sender))
    }

    pub fn from_parts(tx: ShutterTx, raw: Vec<u8>, sender: Address) -> (Self, TxResultReceiver) {
        let (result_tx, result_rx) = oneshot::channel();
        let pending = Self {
            hash: tx_hash(&raw),
            tx,
            raw,
            sender,
            received_at: Instant::now(),
            committed: false,
            result: Some(result_tx),
        };
        (pending, TxResultReceiver(result_rx))
    }

    /// Epoch id the transaction is encrypted for.
    pub fn epoch_id(&self) -> EpochId {
        EpochId::from_u64(self.tx.batch_index)
    }

    pub fn size(&self) -> usize {
        self.raw.len()
    }

    /// Resolve the result channel. A receiver that went away is not an error.
    pub fn resolve(mut self, result: TxResult) {
        if let Some(sender) = self.result.take() {
            let _ = sender.send(result);
        }
    }

    /// Split off the result sender; used when the transaction body is kept in
    /// a queue while the outcome is still open.
    pub fn take_result(&mut self) -> Option<oneshot::Sender<TxResult>> {
        self.result.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::Secp256k1KeyPair;
    use shared_types::U256;

    fn raw_tx(batch_index: u64) -> (Vec<u8>, Address) {
        let key = Secp256k1KeyPair::from_bytes([3u8; 32]).unwrap();
        let tx = ShutterTx {
            chain_id: U256::from(1),
            nonce: 0,
            gas_tip_cap: U256::from(1),
            gas_fee_cap: U256::from(2),
            gas: 21000,
            encrypted_payload: vec![1, 2, 3],
            batch_index,
            signature: None,
        }
        .sign(&key)
        .unwrap();
        (tx.encode().unwrap(), key.address())
    }

    #[tokio::test]
    async fn test_resolve_delivers_once() {
        let (raw, sender) = raw_tx(4);
        let (pending, rx) = PendingTransaction::new(raw.clone()).unwrap();
        assert_eq!(pending.sender, sender);
        assert_eq!(pending.epoch_id(), EpochId::from_u64(4));
        assert_eq!(pending.hash, tx_hash(&raw));

        pending.resolve(Err(TxRejection::BatchAlreadyCommitted));
        assert_eq!(rx.wait().await, Err(TxRejection::BatchAlreadyCommitted));
    }

    #[tokio::test]
    async fn test_dropped_transaction_reports_unavailable() {
        let (raw, _) = raw_tx(1);
        let (pending, mut rx) = PendingTransaction::new(raw).unwrap();
        assert!(rx.try_result().is_none());
        drop(pending);
        assert!(matches!(rx.try_result(), Some(Err(TxRejection::Unavailable(_)))));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(PendingTransaction::new(vec![0x50, 0x01]).is_err());
    }
}
