//! # Node Configuration
//!
//! Unified configuration of a local devnet: one collator, `num_keypers`
//! keypers and a mock sequencer, all in one process.
//!
//! | Variable                   | Default        |
//! |----------------------------|----------------|
//! | `RS_DEVNET_NUM_KEYPERS`    | `3`            |
//! | `RS_DEVNET_THRESHOLD`      | `2`            |
//! | `RS_DEVNET_DKG_SEED`       | `1`            |
//! | `RS_DEVNET_CHAIN_ID`       | `1337`         |
//! | `RS_DEVNET_BASE_FEE`       | `1`            |
//! | `RS_DEVNET_GAS_LIMIT`      | `30000000`     |
//! | `RS_DEVNET_FUNDED_ACCOUNTS`| comma separated hex addresses |
//! | `RS_DEVNET_INITIAL_BALANCE`| `10^18`        |
//!
//! The collator is read with prefix `RS_COLLATOR`, keyper `i` with
//! `RS_KEYPER_<i>`. Missing Ethereum keys fall back to well-known devnet
//! keys and the P2P environment defaults to `local`.
//!
//! The standalone modes run one role each over libp2p. [`CollatorNodeConfig`]
//! reads `RS_COLLATOR_*`, [`KeyperNodeConfig`] reads `RS_KEYPER_*`, and both
//! read the committee from `RS_COMMITTEE_*` (see [`CommitteeConfig`]).

use std::fmt;
use std::str::FromStr;

use rs_03_collator::{CollatorConfig, CollatorError};
use rs_04_keyper::{KeyperConfig, KeyperError};
use shared_types::{address_from_hex, Address, U256};
use shutter_telemetry::TelemetryConfig;
use thiserror::Error;

use crate::container::CommitteeConfig;

pub const DEFAULT_NUM_KEYPERS: u64 = 3;
pub const DEFAULT_THRESHOLD: u64 = 2;
pub const DEFAULT_CHAIN_ID: u64 = 1337;
pub const DEFAULT_GAS_LIMIT: u64 = 30_000_000;
pub const DEFAULT_INITIAL_BALANCE: u64 = 1_000_000_000_000_000_000;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("threshold {threshold} out of range for {num_keypers} keypers")]
    InvalidThreshold { threshold: u64, num_keypers: u64 },

    #[error("keyper {0} shares its ethereum key with another node")]
    DuplicateKey(usize),

    #[error("unknown node mode {0:?}, expected devnet, collator or keyper")]
    UnknownMode(String),

    #[error(transparent)]
    Collator(#[from] CollatorError),

    #[error(transparent)]
    Keyper(#[from] KeyperError),
}

/// Chain and committee parameters of the devnet.
#[derive(Debug, Clone)]
pub struct DevnetConfig {
    pub num_keypers: u64,
    pub threshold: u64,
    /// Seed of the trusted dealer standing in for the DKG.
    pub dkg_seed: u64,
    pub chain_id: U256,
    pub base_fee: U256,
    pub gas_limit: u64,
    pub funded_accounts: Vec<Address>,
    pub initial_balance: U256,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            num_keypers: DEFAULT_NUM_KEYPERS,
            threshold: DEFAULT_THRESHOLD,
            dkg_seed: 1,
            chain_id: U256::from(DEFAULT_CHAIN_ID),
            base_fee: U256::one(),
            gas_limit: DEFAULT_GAS_LIMIT,
            funded_accounts: Vec::new(),
            initial_balance: U256::from(DEFAULT_INITIAL_BALANCE),
        }
    }
}

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub telemetry: TelemetryConfig,
    pub devnet: DevnetConfig,
    pub collator: CollatorConfig,
    /// Indexed like the keyper set.
    pub keypers: Vec<KeyperConfig>,
}

impl NodeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(TelemetryConfig::from_env(), |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(telemetry: TelemetryConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let devnet = devnet_from_lookup(&lookup)?;

        let collator = CollatorConfig::from_lookup("RS_COLLATOR", |key| {
            lookup(key).or_else(|| devnet_default("RS_COLLATOR", key, DEVNET_COLLATOR_KEY))
        })?;
        let keypers = (0..devnet.num_keypers)
            .map(|i| {
                let prefix = format!("RS_KEYPER_{i}");
                KeyperConfig::from_lookup(&prefix, |key| {
                    lookup(key).or_else(|| devnet_default(&prefix, key, devnet_keyper_key(i)))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let config = Self {
            telemetry,
            devnet,
            collator,
            keypers,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let num_keypers = self.keypers.len() as u64;
        if num_keypers == 0 || self.devnet.threshold == 0 || self.devnet.threshold > num_keypers {
            return Err(ConfigError::InvalidThreshold {
                threshold: self.devnet.threshold,
                num_keypers,
            });
        }
        self.collator.validate()?;

        let mut seen = vec![self.collator.ethereum_key];
        for (i, keyper) in self.keypers.iter().enumerate() {
            keyper.validate()?;
            if keyper.instance_id != self.collator.instance_id {
                return Err(ConfigError::InvalidValue {
                    name: format!("RS_KEYPER_{i}_INSTANCE_ID"),
                    reason: format!(
                        "{} differs from collator instance id {}",
                        keyper.instance_id, self.collator.instance_id
                    ),
                });
            }
            if seen.contains(&keyper.ethereum_key) {
                return Err(ConfigError::DuplicateKey(i));
            }
            seen.push(keyper.ethereum_key);
        }
        Ok(())
    }
}

/// Which role the binary runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeMode {
    /// Collator, keyper committee and mock sequencer in one process.
    #[default]
    Devnet,
    Collator,
    Keyper,
}

impl NodeMode {
    /// First command line argument, else `RS_NODE_MODE`, else devnet.
    pub fn select(arg: Option<String>, env: Option<String>) -> Result<Self, ConfigError> {
        match arg.or(env).filter(|m| !m.is_empty()) {
            Some(mode) => mode.parse(),
            None => Ok(Self::default()),
        }
    }
}

impl FromStr for NodeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "devnet" => Ok(Self::Devnet),
            "collator" => Ok(Self::Collator),
            "keyper" => Ok(Self::Keyper),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for NodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Devnet => "devnet",
            Self::Collator => "collator",
            Self::Keyper => "keyper",
        };
        f.write_str(name)
    }
}

/// Standalone collator against a JSON-RPC sequencer and L1 node.
#[derive(Debug, Clone)]
pub struct CollatorNodeConfig {
    pub telemetry: TelemetryConfig,
    pub collator: CollatorConfig,
    pub committee: CommitteeConfig,
}

impl CollatorNodeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(TelemetryConfig::from_env(), |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(telemetry: TelemetryConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            telemetry,
            collator: CollatorConfig::from_lookup("RS_COLLATOR", &lookup)?,
            committee: CommitteeConfig::from_lookup(&lookup)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// The collator key must be the one registered for the committee.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.collator.validate()?;
        self.committee.validate()?;
        let address = self.collator.signing_key()?.address();
        if address != self.committee.collator {
            return Err(ConfigError::InvalidValue {
                name: "RS_COMMITTEE_COLLATOR".to_string(),
                reason: format!(
                    "collator key belongs to {}, not {}",
                    hex::encode(address),
                    hex::encode(self.committee.collator)
                ),
            });
        }
        Ok(())
    }
}

/// Standalone keyper holding its dealer share of the committee eon.
#[derive(Debug, Clone)]
pub struct KeyperNodeConfig {
    pub telemetry: TelemetryConfig,
    pub keyper: KeyperConfig,
    pub committee: CommitteeConfig,
}

impl KeyperNodeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(TelemetryConfig::from_env(), |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(telemetry: TelemetryConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            telemetry,
            keyper: KeyperConfig::from_lookup("RS_KEYPER", &lookup)?,
            committee: CommitteeConfig::from_lookup(&lookup)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.keyper.validate()?;
        self.committee.validate()?;
        self.keyper_index().map(|_| ())
    }

    /// Position of the keyper's address in the committee.
    pub fn keyper_index(&self) -> Result<u64, ConfigError> {
        let address = self.keyper.signing_key()?.address();
        self.committee
            .keyper_index(&address)
            .ok_or_else(|| ConfigError::InvalidValue {
                name: "RS_COMMITTEE_KEYPERS".to_string(),
                reason: format!("keyper {} is not a member", hex::encode(address)),
            })
    }
}

const DEVNET_COLLATOR_KEY: [u8; 32] = [0x01; 32];

fn devnet_keyper_key(index: u64) -> [u8; 32] {
    let mut key = [0x10; 32];
    key[31] = index as u8;
    key[30] = (index >> 8) as u8;
    key
}

/// Devnet fallbacks for variables the operator left unset.
fn devnet_default(prefix: &str, key: &str, ethereum_key: [u8; 32]) -> Option<String> {
    let name = key.strip_prefix(prefix)?.strip_prefix('_')?;
    match name {
        "ETHEREUM_KEY" => Some(hex::encode(ethereum_key)),
        "P2P_ENVIRONMENT" => Some("local".to_string()),
        _ => None,
    }
}

fn devnet_from_lookup<F>(lookup: &F) -> Result<DevnetConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| {
        let key = format!("RS_DEVNET_{name}");
        lookup(&key).filter(|v| !v.is_empty()).map(|v| (key, v))
    };
    let invalid = |name: String, reason: String| ConfigError::InvalidValue { name, reason };
    let parse_u64 = |(name, value): (String, String)| {
        value
            .parse::<u64>()
            .map_err(|e| invalid(name, e.to_string()))
    };
    let parse_u256 = |(name, value): (String, String)| {
        U256::from_dec_str(&value).map_err(|e| invalid(name, format!("{e:?}")))
    };

    let mut config = DevnetConfig::default();
    if let Some(v) = var("NUM_KEYPERS") {
        config.num_keypers = parse_u64(v)?;
    }
    if let Some(v) = var("THRESHOLD") {
        config.threshold = parse_u64(v)?;
    }
    if let Some(v) = var("DKG_SEED") {
        config.dkg_seed = parse_u64(v)?;
    }
    if let Some(v) = var("CHAIN_ID") {
        config.chain_id = parse_u256(v)?;
    }
    if let Some(v) = var("BASE_FEE") {
        config.base_fee = parse_u256(v)?;
    }
    if let Some(v) = var("GAS_LIMIT") {
        config.gas_limit = parse_u64(v)?;
    }
    if let Some(v) = var("INITIAL_BALANCE") {
        config.initial_balance = parse_u256(v)?;
    }
    if let Some((name, value)) = var("FUNDED_ACCOUNTS") {
        config.funded_accounts = value
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(|a| address_from_hex(a).map_err(|e| invalid(name.clone(), e.to_string())))
            .collect::<Result<_, _>>()?;
    }
    Ok(config)
}
