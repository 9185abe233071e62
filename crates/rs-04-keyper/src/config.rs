//! Keyper configuration.
//!
//! | Variable                              | Default                 |
//! |---------------------------------------|-------------------------|
//! | `<PREFIX>_INSTANCE_ID`                | `0`                     |
//! | `<PREFIX>_MAX_NUM_KEYS_PER_MESSAGE`   | `500`                   |
//! | `<PREFIX>_ETHEREUM_KEY`               | required, hex secp256k1 |
//!
//! P2P options are read with the same prefix, see [`P2pConfig`].

use std::fmt;

use rs_02_p2p_messaging::P2pConfig;
use shared_crypto::Secp256k1KeyPair;

use crate::domain::KeyperError;
use crate::service::KeyperSettings;

pub const DEFAULT_MAX_NUM_KEYS_PER_MESSAGE: usize = 500;

#[derive(Clone)]
pub struct KeyperConfig {
    pub instance_id: u64,
    /// secp256k1 secret identifying the keyper in keyper sets.
    pub ethereum_key: [u8; 32],
    pub max_num_keys_per_message: usize,
    pub p2p: P2pConfig,
}

impl fmt::Debug for KeyperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyperConfig")
            .field("instance_id", &self.instance_id)
            .field("max_num_keys_per_message", &self.max_num_keys_per_message)
            .field("p2p", &self.p2p)
            .finish_non_exhaustive()
    }
}

impl KeyperConfig {
    pub fn new(ethereum_key: [u8; 32], p2p: P2pConfig) -> Self {
        Self {
            instance_id: 0,
            ethereum_key,
            max_num_keys_per_message: DEFAULT_MAX_NUM_KEYS_PER_MESSAGE,
            p2p,
        }
    }

    /// Load from the process environment.
    pub fn from_env(prefix: &str) -> Result<Self, KeyperError> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, KeyperError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{prefix}_{name}")).filter(|v| !v.is_empty());

        let key_hex = var("ETHEREUM_KEY")
            .ok_or_else(|| KeyperError::Config(format!("{prefix}_ETHEREUM_KEY is required")))?;
        let p2p = P2pConfig::from_lookup(prefix, &lookup)
            .map_err(|e| KeyperError::Config(e.to_string()))?;
        let mut config = Self::new(parse_key(&key_hex)?, p2p);

        if let Some(v) = var("INSTANCE_ID") {
            config.instance_id = v
                .parse()
                .map_err(|_| KeyperError::Config(format!("invalid instance id {v:?}")))?;
        }
        if let Some(v) = var("MAX_NUM_KEYS_PER_MESSAGE") {
            config.max_num_keys_per_message = v.parse().map_err(|_| {
                KeyperError::Config(format!("invalid max number of keys per message {v:?}"))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), KeyperError> {
        if self.max_num_keys_per_message == 0 {
            return Err(KeyperError::Config(
                "max number of keys per message must be positive".to_string(),
            ));
        }
        self.signing_key()?;
        Ok(())
    }

    pub fn signing_key(&self) -> Result<Secp256k1KeyPair, KeyperError> {
        Ok(Secp256k1KeyPair::from_bytes(self.ethereum_key)?)
    }

    pub fn settings(&self) -> KeyperSettings {
        KeyperSettings {
            instance_id: self.instance_id,
            max_num_keys_per_message: self.max_num_keys_per_message,
        }
    }
}

fn parse_key(value: &str) -> Result<[u8; 32], KeyperError> {
    let bytes = hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map_err(|e| KeyperError::Config(format!("invalid ethereum key: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| KeyperError::Config("ethereum key must be 32 bytes".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY: &str = "1414141414141414141414141414141414141414141414141414141414141414";

    fn load(vars: &[(&str, &str)]) -> Result<KeyperConfig, KeyperError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        KeyperConfig::from_lookup("RS_KEYPER", move |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_and_overrides() {
        let config = load(&[("RS_KEYPER_ETHEREUM_KEY", KEY)]).unwrap();
        assert_eq!(config.max_num_keys_per_message, DEFAULT_MAX_NUM_KEYS_PER_MESSAGE);
        assert_eq!(config.instance_id, 0);

        let config = load(&[
            ("RS_KEYPER_ETHEREUM_KEY", KEY),
            ("RS_KEYPER_INSTANCE_ID", "42"),
            ("RS_KEYPER_MAX_NUM_KEYS_PER_MESSAGE", "10"),
        ])
        .unwrap();
        assert_eq!(config.settings().instance_id, 42);
        assert_eq!(config.settings().max_num_keys_per_message, 10);
        assert!(!format!("{config:?}").contains("141414"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[]).is_err());
        assert!(load(&[
            ("RS_KEYPER_ETHEREUM_KEY", KEY),
            ("RS_KEYPER_MAX_NUM_KEYS_PER_MESSAGE", "0")
        ])
        .is_err());
        assert!(load(&[("RS_KEYPER_ETHEREUM_KEY", KEY), ("RS_KEYPER_INSTANCE_ID", "x")]).is_err());
    }
}
