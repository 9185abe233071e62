//! Collator configuration.
//!
//! | Variable                                   | Default                  |
//! |--------------------------------------------|--------------------------|
//! | `<PREFIX>_INSTANCE_ID`                     | `0`                      |
//! | `<PREFIX>_EPOCH_DURATION_MS`               | `5000`                   |
//! | `<PREFIX>_EXECUTION_BLOCK_DELAY`           | `5`                      |
//! | `<PREFIX>_BATCH_INDEX_ACCEPTANCE_INTERVAL` | `5`                      |
//! | `<PREFIX>_SEQUENCER_URL`                   | `http://localhost:8555`  |
//! | `<PREFIX>_ETHEREUM_URL`                    | `http://localhost:8545`  |
//! | `<PREFIX>_RPC_ADDRESS`                     | `127.0.0.1:3000`         |
//! | `<PREFIX>_ETHEREUM_KEY`                    | required, hex secp256k1  |
//!
//! P2P options are read with the same prefix, see [`P2pConfig`].

use std::fmt;
use std::time::Duration;

use rs_02_p2p_messaging::P2pConfig;
use shared_crypto::Secp256k1KeyPair;
use shared_types::RetryOptions;

use crate::domain::CollatorError;
use crate::service::CollatorSettings;

pub const DEFAULT_EPOCH_DURATION: Duration = Duration::from_secs(5);
pub const DEFAULT_EXECUTION_BLOCK_DELAY: u64 = 5;
pub const DEFAULT_BATCH_INDEX_ACCEPTANCE_INTERVAL: u64 = 5;
pub const DEFAULT_SEQUENCER_URL: &str = "http://localhost:8555";
pub const DEFAULT_ETHEREUM_URL: &str = "http://localhost:8545";
pub const DEFAULT_RPC_ADDRESS: &str = "127.0.0.1:3000";

/// Largest future admission window. The batch pool keeps the next batch
/// plus one batch per index of the window alive.
pub const SIZE_BATCH_POOL: u64 = 5;

#[derive(Clone)]
pub struct CollatorConfig {
    pub instance_id: u64,
    pub epoch_duration: Duration,
    pub execution_block_delay: u64,
    pub batch_index_acceptance_interval: u64,
    pub sequencer_url: String,
    pub ethereum_url: String,
    /// Listen address of the user-facing JSON-RPC server.
    pub rpc_address: String,
    /// secp256k1 secret signing triggers and batch transactions.
    pub ethereum_key: [u8; 32],
    pub p2p: P2pConfig,
}

impl fmt::Debug for CollatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollatorConfig")
            .field("instance_id", &self.instance_id)
            .field("epoch_duration", &self.epoch_duration)
            .field("execution_block_delay", &self.execution_block_delay)
            .field(
                "batch_index_acceptance_interval",
                &self.batch_index_acceptance_interval,
            )
            .field("sequencer_url", &self.sequencer_url)
            .field("ethereum_url", &self.ethereum_url)
            .field("rpc_address", &self.rpc_address)
            .field("p2p", &self.p2p)
            .finish_non_exhaustive()
    }
}

impl CollatorConfig {
    pub fn new(ethereum_key: [u8; 32], p2p: P2pConfig) -> Self {
        Self {
            instance_id: 0,
            epoch_duration: DEFAULT_EPOCH_DURATION,
            execution_block_delay: DEFAULT_EXECUTION_BLOCK_DELAY,
            batch_index_acceptance_interval: DEFAULT_BATCH_INDEX_ACCEPTANCE_INTERVAL,
            sequencer_url: DEFAULT_SEQUENCER_URL.to_string(),
            ethereum_url: DEFAULT_ETHEREUM_URL.to_string(),
            rpc_address: DEFAULT_RPC_ADDRESS.to_string(),
            ethereum_key,
            p2p,
        }
    }

    /// Load from the process environment.
    pub fn from_env(prefix: &str) -> Result<Self, CollatorError> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, CollatorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{prefix}_{name}")).filter(|v| !v.is_empty());

        let key_hex = var("ETHEREUM_KEY")
            .ok_or_else(|| CollatorError::Config(format!("{prefix}_ETHEREUM_KEY is required")))?;
        let p2p = P2pConfig::from_lookup(prefix, &lookup)
            .map_err(|e| CollatorError::Config(e.to_string()))?;
        let mut config = Self::new(parse_key(&key_hex)?, p2p);

        if let Some(v) = var("INSTANCE_ID") {
            config.instance_id = parse_u64("INSTANCE_ID", &v)?;
        }
        if let Some(v) = var("EPOCH_DURATION_MS") {
            config.epoch_duration = Duration::from_millis(parse_u64("EPOCH_DURATION_MS", &v)?);
        }
        if let Some(v) = var("EXECUTION_BLOCK_DELAY") {
            config.execution_block_delay = parse_u64("EXECUTION_BLOCK_DELAY", &v)?;
        }
        if let Some(v) = var("BATCH_INDEX_ACCEPTANCE_INTERVAL") {
            config.batch_index_acceptance_interval =
                parse_u64("BATCH_INDEX_ACCEPTANCE_INTERVAL", &v)?;
        }
        if let Some(v) = var("SEQUENCER_URL") {
            config.sequencer_url = v;
        }
        if let Some(v) = var("ETHEREUM_URL") {
            config.ethereum_url = v;
        }
        if let Some(v) = var("RPC_ADDRESS") {
            config.rpc_address = v;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CollatorError> {
        if self.epoch_duration.is_zero() {
            return Err(CollatorError::Config("epoch duration must be positive".to_string()));
        }
        if self.batch_index_acceptance_interval == 0
            || self.batch_index_acceptance_interval > SIZE_BATCH_POOL
        {
            return Err(CollatorError::Config(format!(
                "batch index acceptance interval must be in 1..={SIZE_BATCH_POOL}"
            )));
        }
        self.signing_key()?;
        Ok(())
    }

    pub fn signing_key(&self) -> Result<Secp256k1KeyPair, CollatorError> {
        Ok(Secp256k1KeyPair::from_bytes(self.ethereum_key)?)
    }

    /// Settings handed to the collator tasks.
    pub fn settings(&self) -> CollatorSettings {
        CollatorSettings {
            instance_id: self.instance_id,
            execution_block_delay: self.execution_block_delay,
            batch_index_acceptance_interval: self.batch_index_acceptance_interval,
            epoch_duration: self.epoch_duration,
            rpc_retry: RetryOptions::default(),
        }
    }
}

fn parse_u64(field: &str, value: &str) -> Result<u64, CollatorError> {
    value
        .parse()
        .map_err(|_| CollatorError::Config(format!("invalid value {value:?} for {field}")))
}

fn parse_key(value: &str) -> Result<[u8; 32], CollatorError> {
    let bytes = hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map_err(|e| CollatorError::Config(format!("invalid ethereum key: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| CollatorError::Config("ethereum key must be 32 bytes".to_string()))
}
