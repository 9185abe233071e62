//! P2P configuration.
//!
//! Environment variables (with a caller-chosen prefix, e.g. `RS_COLLATOR`):
//!
//! | Variable                         | Meaning                                   |
//! |----------------------------------|-------------------------------------------|
//! | `<PREFIX>_P2P_KEY`               | hex ed25519 seed; random when unset        |
//! | `<PREFIX>_P2P_LISTEN_ADDRESSES`  | comma separated                            |
//! | `<PREFIX>_P2P_ADVERTISE_ADDRESSES` | comma separated                          |
//! | `<PREFIX>_P2P_BOOTSTRAP_ADDRESSES` | comma separated `<transport>/p2p/<peer>` |
//! | `<PREFIX>_P2P_DISCOVERY_NAMESPACE` | DHT rendezvous namespace                 |
//! | `<PREFIX>_P2P_ENVIRONMENT`       | `production`, `staging` or `local`         |

use crate::domain::{
    BootstrapAddress, BootstrapPlan, ConfigError, Environment, MeshParams, P2pKey, PeerId,
};

pub const DEFAULT_LISTEN_ADDRESS: &str = "/ip4/0.0.0.0/tcp/23000";
pub const DEFAULT_DISCOVERY_NAMESPACE: &str = "shutter";

#[derive(Debug, Clone)]
pub struct P2pConfig {
    pub p2p_key: P2pKey,
    pub listen_addresses: Vec<String>,
    pub advertise_addresses: Vec<String>,
    /// Overrides the environment's default bootstrap list when non-empty.
    pub custom_bootstrap_addresses: Vec<BootstrapAddress>,
    pub discovery_namespace: String,
    pub environment: Environment,
}

impl P2pConfig {
    pub fn new(p2p_key: P2pKey) -> Self {
        Self {
            p2p_key,
            listen_addresses: vec![DEFAULT_LISTEN_ADDRESS.to_string()],
            advertise_addresses: Vec::new(),
            custom_bootstrap_addresses: Vec::new(),
            discovery_namespace: DEFAULT_DISCOVERY_NAMESPACE.to_string(),
            environment: Environment::default(),
        }
    }

    /// Load from the process environment.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{prefix}_P2P_{name}")).filter(|v| !v.is_empty());

        let p2p_key = match var("KEY") {
            Some(hex) => P2pKey::from_hex(&hex)?,
            None => P2pKey::generate(),
        };
        let mut config = Self::new(p2p_key);

        if let Some(v) = var("LISTEN_ADDRESSES") {
            config.listen_addresses = split_list(&v);
        }
        if let Some(v) = var("ADVERTISE_ADDRESSES") {
            config.advertise_addresses = split_list(&v);
        }
        if let Some(v) = var("BOOTSTRAP_ADDRESSES") {
            config.custom_bootstrap_addresses = split_list(&v)
                .iter()
                .map(|a| a.parse())
                .collect::<Result<_, _>>()?;
        }
        if let Some(v) = var("DISCOVERY_NAMESPACE") {
            config.discovery_namespace = v;
        }
        if let Some(v) = var("ENVIRONMENT") {
            config.environment = v.parse()?;
        }
        Ok(config)
    }

    pub fn peer_id(&self) -> PeerId {
        self.p2p_key.peer_id()
    }

    /// Custom bootstrap addresses, or the environment defaults when none
    /// are configured.
    pub fn bootstrap_addresses(&self) -> Result<Vec<BootstrapAddress>, ConfigError> {
        if !self.custom_bootstrap_addresses.is_empty() {
            return Ok(self.custom_bootstrap_addresses.clone());
        }
        self.environment
            .default_bootstrap_peers()
            .iter()
            .map(|a| a.parse())
            .collect()
    }

    pub fn bootstrap_plan(&self) -> Result<BootstrapPlan, ConfigError> {
        BootstrapPlan::resolve(self.peer_id(), self.bootstrap_addresses()?)
    }

    pub fn mesh_params(&self, plan: &BootstrapPlan) -> MeshParams {
        MeshParams::for_node(plan.is_bootstrap_node)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, String)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = P2pConfig::from_lookup("RS", |_| None).unwrap();
        assert_eq!(config.listen_addresses, vec![DEFAULT_LISTEN_ADDRESS]);
        assert_eq!(config.discovery_namespace, "shutter");
        assert_eq!(config.environment, Environment::Production);
        assert!(config.custom_bootstrap_addresses.is_empty());
    }

    #[test]
    fn test_from_lookup() {
        let boot = P2pKey::from_seed([2; 32]).peer_id();
        let config = P2pConfig::from_lookup(
            "RS_KEYPER",
            lookup(&[
                ("RS_KEYPER_P2P_KEY", hex::encode([1u8; 32])),
                ("RS_KEYPER_P2P_ENVIRONMENT", "local".to_string()),
                (
                    "RS_KEYPER_P2P_BOOTSTRAP_ADDRESSES",
                    format!("/ip4/10.0.0.1/tcp/23000/p2p/{boot}"),
                ),
                (
                    "RS_KEYPER_P2P_LISTEN_ADDRESSES",
                    "/ip4/0.0.0.0/tcp/1, /ip4/0.0.0.0/tcp/2".to_string(),
                ),
            ]),
        )
        .unwrap();

        assert_eq!(config.peer_id(), P2pKey::from_seed([1; 32]).peer_id());
        assert_eq!(config.environment, Environment::Local);
        assert_eq!(config.listen_addresses.len(), 2);

        let plan = config.bootstrap_plan().unwrap();
        assert!(!plan.is_bootstrap_node);
        assert_eq!(plan.peer_ids().collect::<Vec<_>>(), vec![boot]);

        assert!(config.environment.is_testing());
        assert_eq!(config.mesh_params(&plan), MeshParams::default());
    }

    #[test]
    fn test_invalid_bootstrap_address() {
        let result = P2pConfig::from_lookup(
            "RS",
            lookup(&[("RS_P2P_BOOTSTRAP_ADDRESSES", "/ip4/1.2.3.4/tcp/1".to_string())]),
        );
        assert!(matches!(result, Err(ConfigError::InvalidBootstrapAddress(_))));
    }

    #[test]
    fn test_no_bootstrap_peers_in_production() {
        let config = P2pConfig::new(P2pKey::from_seed([1; 32]));
        assert_eq!(config.bootstrap_plan(), Err(ConfigError::NoBootstrapPeers));
    }

    #[test]
    fn test_own_address_makes_bootstrap_node() {
        let key = P2pKey::from_seed([1; 32]);
        let mut config = P2pConfig::new(key.clone());
        config.custom_bootstrap_addresses = vec![format!("/ip4/127.0.0.1/tcp/1/p2p/{}", key.peer_id())
            .parse()
            .unwrap()];

        let plan = config.bootstrap_plan().unwrap();
        assert!(plan.is_bootstrap_node);
        assert_eq!(config.mesh_params(&plan), MeshParams::for_bootstrap_node());
    }
}
