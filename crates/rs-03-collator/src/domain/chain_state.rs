//! # Execution-State Cache
//!
//! The smallest projection of sequencer state needed to decide whether an
//! encrypted transaction fits into the next batch: per-account balance and
//! nonce, plus the block context and what the batch has consumed so far.
//!
//! ## Admission checks (in order)
//!
//! | Check                  | Rejection                  |
//! |------------------------|----------------------------|
//! | chain id               | `WrongChainId`             |
//! | account cached         | `AccountNotInitialized`    |
//! | nonce == cached nonce  | `NonceMismatch`            |
//! | gas parameters         | `InvalidGasParams`         |
//! | balance ≥ gas cost     | `CannotPayGasFee`          |
//! | gas used + gas ≤ limit | `GasLimitReached`          |
//! | size + tx size ≤ 8 KiB | `BatchSizeLimitReached`    |
//!
//! ## Locking
//!
//! A [`KeyedMutex`] serialises read-modify-write of a single account; the
//! account map itself sits behind an `RwLock`, taken for writing only to
//! insert or remove entries.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};
use shared_types::{Address, EpochId, U256};

use crate::domain::errors::{CollatorError, TxRejection};
use crate::domain::keyed_mutex::KeyedMutex;
use crate::domain::transaction::ShutterTx;

/// Minimum gas of any transaction.
pub const MINIMUM_TX_GAS: u64 = 21_000;
/// Maximum summed raw size of the transactions in one batch.
pub const BATCH_SIZE_LIMIT: usize = 8 * 1024;

/// Block the batch is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    pub number: u64,
    pub base_fee: U256,
    pub gas_limit: u64,
    pub coinbase: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Account {
    pub balance: U256,
    pub nonce: u64,
}

#[derive(Debug, Default)]
struct Usage {
    gas_used: u64,
    size_in_bytes: usize,
    num_transactions: usize,
}

/// `gas_fee_cap ≥ gas_tip_cap`, `gas_fee_cap ≥ base_fee`, `gas ≥ 21000`.
pub fn validate_gas_params(tx: &ShutterTx, base_fee: U256) -> Result<(), TxRejection> {
    if tx.gas < MINIMUM_TX_GAS {
        return Err(TxRejection::InvalidGasParams(format!(
            "tx gas lower than minimum ({} < {MINIMUM_TX_GAS})",
            tx.gas
        )));
    }
    if tx.gas_fee_cap < tx.gas_tip_cap {
        return Err(TxRejection::InvalidGasParams(format!(
            "gas fee cap lower than gas tip cap ({} < {})",
            tx.gas_fee_cap, tx.gas_tip_cap
        )));
    }
    if tx.gas_fee_cap < base_fee {
        return Err(TxRejection::InvalidGasParams(format!(
            "gas fee cap lower than header base fee ({} < {base_fee})",
            tx.gas_fee_cap
        )));
    }
    Ok(())
}

fn priority_gas_price(tx: &ShutterTx, base_fee: U256) -> U256 {
    tx.gas_tip_cap
        .min(tx.gas_fee_cap.saturating_sub(base_fee))
}

/// Total fee debited from the sender: `(min(tip, fee_cap - base_fee) + base_fee) * gas`.
pub fn gas_cost(tx: &ShutterTx, base_fee: U256) -> Option<U256> {
    priority_gas_price(tx, base_fee)
        .checked_add(base_fee)?
        .checked_mul(U256::from(tx.gas))
}

/// Share of the fee credited to the coinbase: `min(tip, fee_cap - base_fee) * gas`.
pub fn priority_fee(tx: &ShutterTx, base_fee: U256) -> Option<U256> {
    priority_gas_price(tx, base_fee).checked_mul(U256::from(tx.gas))
}

/// L1 block a new batch is bound to: `max(current - delay, previous, 0)`.
pub fn next_execution_block(current: u64, previous: u64, delay: u64) -> u64 {
    current.saturating_sub(delay).max(previous)
}

#[derive(Debug)]
pub struct ChainState {
    epoch_id: EpochId,
    chain_id: U256,
    block: BlockContext,
    accounts: RwLock<HashMap<Address, Account>>,
    account_locks: KeyedMutex<Address>,
    usage: Mutex<Usage>,
}

impl ChainState {
    pub fn new(epoch_id: EpochId, chain_id: U256, block: BlockContext) -> Self {
        Self {
            epoch_id,
            chain_id,
            block,
            accounts: RwLock::new(HashMap::new()),
            account_locks: KeyedMutex::new(),
            usage: Mutex::new(Usage::default()),
        }
    }

    pub fn epoch_id(&self) -> EpochId {
        self.epoch_id
    }

    pub fn chain_id(&self) -> U256 {
        self.chain_id
    }

    pub fn block(&self) -> &BlockContext {
        &self.block
    }

    pub fn base_fee(&self) -> U256 {
        self.block.base_fee
    }

    pub fn block_gas_limit(&self) -> u64 {
        self.block.gas_limit
    }

    pub fn gas_used(&self) -> u64 {
        self.usage.lock().gas_used
    }

    pub fn size_in_bytes(&self) -> usize {
        self.usage.lock().size_in_bytes
    }

    pub fn num_transactions(&self) -> usize {
        self.usage.lock().num_transactions
    }

    pub fn is_initialized(&self, address: &Address) -> bool {
        self.accounts.read().contains_key(address)
    }

    pub fn account(&self, address: &Address) -> Option<Account> {
        self.accounts.read().get(address).copied()
    }

    /// First-time population of an account. Returns `false` and leaves the
    /// cached values untouched when the account is already known.
    pub fn initialize(&self, address: Address, balance: U256, nonce: u64) -> bool {
        let _guard = self.account_locks.lock(&address);
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&address) {
            return false;
        }
        accounts.insert(address, Account { balance, nonce });
        true
    }

    /// Forget an account; the next use fetches it again.
    pub fn purge(&self, address: &Address) {
        let _guard = self.account_locks.lock(address);
        self.accounts.write().remove(address);
    }

    /// Whether `tx` from `sender` fits on top of everything applied so far.
    pub fn can_apply(&self, tx: &ShutterTx, sender: &Address, size: usize) -> Result<(), TxRejection> {
        if tx.chain_id != self.chain_id {
            return Err(TxRejection::WrongChainId {
                expected: self.chain_id,
                actual: tx.chain_id,
            });
        }

        let _guard = self.account_locks.lock(sender);
        let account = self
            .account(sender)
            .ok_or(TxRejection::AccountNotInitialized)?;
        self.check(tx, &account, size)
    }

    fn check(&self, tx: &ShutterTx, account: &Account, size: usize) -> Result<(), TxRejection> {
        if tx.nonce != account.nonce {
            return Err(TxRejection::NonceMismatch {
                expected: account.nonce,
                actual: tx.nonce,
            });
        }

        let base_fee = self.base_fee();
        validate_gas_params(tx, base_fee)?;
        let cost = gas_cost(tx, base_fee)
            .ok_or_else(|| TxRejection::InvalidGasParams("gas cost overflows".to_string()))?;
        if account.balance < cost {
            return Err(TxRejection::CannotPayGasFee {
                balance: account.balance,
                cost,
            });
        }

        let usage = self.usage.lock();
        if usage.gas_used.saturating_add(tx.gas) > self.block.gas_limit {
            return Err(TxRejection::GasLimitReached {
                used: usage.gas_used,
                gas: tx.gas,
                limit: self.block.gas_limit,
            });
        }
        if usage.size_in_bytes + size > BATCH_SIZE_LIMIT {
            return Err(TxRejection::BatchSizeLimitReached {
                used: usage.size_in_bytes,
                size,
                limit: BATCH_SIZE_LIMIT,
            });
        }
        Ok(())
    }

    /// Apply a transaction that just passed [`can_apply`](Self::can_apply).
    ///
    /// Any failure here means the caller skipped the check and is reported
    /// as [`CollatorError::Inconsistent`].
    pub fn apply(&self, tx: &ShutterTx, sender: &Address, size: usize) -> Result<(), CollatorError> {
        let base_fee = self.base_fee();
        {
            let _guard = self.account_locks.lock(sender);
            let mut accounts = self.accounts.write();
            let account = accounts.get_mut(sender).ok_or_else(|| {
                CollatorError::Inconsistent("apply on uninitialized account".to_string())
            })?;
            self.check(tx, account, size).map_err(|e| {
                CollatorError::Inconsistent(format!("apply without successful can_apply: {e}"))
            })?;
            // check() guarantees the cost is representable and covered
            let cost = gas_cost(tx, base_fee).unwrap_or_default();
            account.balance -= cost;
            account.nonce += 1;
        }

        if *sender != self.block.coinbase {
            let _guard = self.account_locks.lock(&self.block.coinbase);
            if let Some(coinbase) = self.accounts.write().get_mut(&self.block.coinbase) {
                let fee = priority_fee(tx, base_fee).unwrap_or_default();
                coinbase.balance = coinbase.balance.saturating_add(fee);
            }
        }

        let mut usage = self.usage.lock();
        usage.gas_used += tx.gas;
        usage.size_in_bytes += size;
        usage.num_transactions += 1;
        Ok(())
    }
}
