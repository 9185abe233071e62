//! Deployment environment.

use std::fmt;
use std::str::FromStr;

use crate::domain::errors::ConfigError;

const DHT_PROTOCOL_PREFIX: &str = "/shutter";
const DHT_PROTOCOL_SUFFIX: &str = "/kad/1.0.0";

/// Production bootstrap peers, used when no custom list is configured.
pub const DEFAULT_BOOTSTRAP_PEERS: &[&str] = &[];

/// Network the node participates in. Selects the DHT protocol id and the
/// default bootstrap list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Production,
    Staging,
    Local,
}

impl Environment {
    /// DHT protocol id, e.g. `/shutter/kad/1.0.0` or `/shutter/kad/1.0.0-local`.
    pub fn dht_protocol(&self) -> String {
        let extension = match self {
            Environment::Production => "",
            Environment::Staging => "-staging",
            Environment::Local => "-local",
        };
        format!("{DHT_PROTOCOL_PREFIX}{DHT_PROTOCOL_SUFFIX}{extension}")
    }

    /// Bootstrap peers to use when none are configured.
    pub fn default_bootstrap_peers(&self) -> &'static [&'static str] {
        match self {
            Environment::Production => DEFAULT_BOOTSTRAP_PEERS,
            Environment::Staging | Environment::Local => &[],
        }
    }

    /// Non-production networks run without IP colocation penalties.
    pub fn is_testing(&self) -> bool {
        !matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Local => "local",
        })
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            "local" => Ok(Environment::Local),
            other => Err(ConfigError::InvalidValue {
                field: "environment",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dht_protocol() {
        assert_eq!(Environment::Production.dht_protocol(), "/shutter/kad/1.0.0");
        assert_eq!(Environment::Staging.dht_protocol(), "/shutter/kad/1.0.0-staging");
        assert_eq!(Environment::Local.dht_protocol(), "/shutter/kad/1.0.0-local");
    }

    #[test]
    fn test_parse() {
        assert_eq!("Local".parse::<Environment>().unwrap(), Environment::Local);
        assert!("moon".parse::<Environment>().is_err());
    }
}
