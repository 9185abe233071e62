//! # Committee Configuration
//!
//! Keyper set and collator registration for the standalone `collator` and
//! `keyper` modes. Both roles seed their chain observer from the same
//! values, so every node of a deployment must be given identical settings.
//!
//! | Variable                         | Default                          |
//! |----------------------------------|----------------------------------|
//! | `RS_COMMITTEE_KEYPERS`           | required, comma separated hex    |
//! | `RS_COMMITTEE_THRESHOLD`         | required                         |
//! | `RS_COMMITTEE_COLLATOR`          | required, hex address            |
//! | `RS_COMMITTEE_ACTIVATION_BLOCK`  | `0`                              |
//! | `RS_COMMITTEE_KEYPER_CONFIG_INDEX`| `0`                             |
//! | `RS_COMMITTEE_EON`               | `1`                              |
//! | `RS_COMMITTEE_DKG_SEED`          | `1`                              |
//!
//! The eon key shares come from a trusted dealer seeded with
//! `RS_COMMITTEE_DKG_SEED`.

use rs_04_keyper::{DkgResult, Eon, PureDkgResult};
use shared_crypto::ThresholdKeyGen;
use shared_types::{address_from_hex, Address, InMemoryChainObserver, KeyperSet};

use crate::container::{ConfigError, NodeError};

const PREFIX: &str = "RS_COMMITTEE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitteeConfig {
    /// Indexed like the keyper set.
    pub keypers: Vec<Address>,
    pub threshold: u64,
    pub collator: Address,
    pub activation_block: u64,
    pub keyper_config_index: u64,
    pub eon: u64,
    pub dkg_seed: u64,
}

impl CommitteeConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{PREFIX}_{name}");
            lookup(&key).filter(|v| !v.is_empty()).map(|v| (key, v))
        };
        let required = |name: &str| {
            var(name).ok_or_else(|| ConfigError::InvalidValue {
                name: format!("{PREFIX}_{name}"),
                reason: "required".to_string(),
            })
        };
        let parse_u64 = |(name, value): (String, String)| {
            value
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    name,
                    reason: e.to_string(),
                })
        };
        let parse_address = |name: &str, value: &str| {
            address_from_hex(value).map_err(|e| ConfigError::InvalidValue {
                name: name.to_string(),
                reason: e.to_string(),
            })
        };

        let (name, value) = required("KEYPERS")?;
        let keypers = value
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(|a| parse_address(&name, a))
            .collect::<Result<Vec<_>, _>>()?;
        let (name, value) = required("COLLATOR")?;
        let collator = parse_address(&name, &value)?;

        let config = Self {
            keypers,
            threshold: parse_u64(required("THRESHOLD")?)?,
            collator,
            activation_block: var("ACTIVATION_BLOCK").map(parse_u64).transpose()?.unwrap_or(0),
            keyper_config_index: var("KEYPER_CONFIG_INDEX")
                .map(parse_u64)
                .transpose()?
                .unwrap_or(0),
            eon: var("EON").map(parse_u64).transpose()?.unwrap_or(1),
            dkg_seed: var("DKG_SEED").map(parse_u64).transpose()?.unwrap_or(1),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let num_keypers = self.keypers.len() as u64;
        if num_keypers == 0 || self.threshold == 0 || self.threshold > num_keypers {
            return Err(ConfigError::InvalidThreshold {
                threshold: self.threshold,
                num_keypers,
            });
        }
        for (i, keyper) in self.keypers.iter().enumerate() {
            if self.keypers[..i].contains(keyper) {
                return Err(ConfigError::DuplicateKey(i));
            }
        }
        Ok(())
    }

    pub fn keyper_set(&self) -> KeyperSet {
        KeyperSet {
            index: self.keyper_config_index,
            activation_block: self.activation_block,
            keypers: self.keypers.clone(),
            threshold: self.threshold,
        }
    }

    /// Chain observer holding the keyper set and the collator, both active
    /// from the activation block.
    pub fn chain_observer(&self) -> InMemoryChainObserver {
        let chain = InMemoryChainObserver::new();
        chain.add_keyper_set(self.keyper_set());
        chain.add_collator(self.activation_block, self.collator);
        chain
    }

    pub fn keyper_index(&self, address: &Address) -> Option<u64> {
        self.keypers
            .iter()
            .position(|k| k == address)
            .map(|i| i as u64)
    }

    pub fn eon(&self) -> Eon {
        Eon {
            eon: self.eon,
            activation_block: self.activation_block,
            keyper_config_index: self.keyper_config_index,
        }
    }

    /// Share of keyper `index` from the trusted dealer.
    pub fn dkg_result(&self, index: u64) -> Result<DkgResult, NodeError> {
        let dealer =
            ThresholdKeyGen::new(self.keypers.len() as u64, self.threshold, self.dkg_seed)?
                .generate()?;
        Ok(DkgResult::Success(PureDkgResult::from_dealer(
            self.eon, index, &dealer,
        )?))
    }
}
