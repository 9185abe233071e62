//! Devnet fixtures shared by the integration flows.

use std::collections::HashMap;
use std::time::Duration;

use node_runtime::{NodeConfig, NodeRuntime};
use rs_03_collator::ShutterTx;
use shared_crypto::Secp256k1KeyPair;
use shared_types::{format_address, U256};
use shutter_telemetry::TelemetryConfig;

pub const USER_KEY: [u8; 32] = [7u8; 32];

/// Long enough that the collator never closes a batch on its own.
pub const IDLE_EPOCH_DURATION_MS: u64 = 3_600_000;

pub fn user() -> Secp256k1KeyPair {
    Secp256k1KeyPair::from_bytes(USER_KEY).unwrap()
}

/// Devnet with default keys, the user funded and the given epoch duration.
pub fn devnet_config(epoch_duration_ms: u64) -> NodeConfig {
    let vars: HashMap<String, String> = [
        (
            "RS_COLLATOR_EPOCH_DURATION_MS".to_string(),
            epoch_duration_ms.to_string(),
        ),
        (
            "RS_DEVNET_FUNDED_ACCOUNTS".to_string(),
            format_address(&user().address()),
        ),
    ]
    .into_iter()
    .collect();
    NodeConfig::from_lookup(TelemetryConfig::default(), move |key| vars.get(key).cloned()).unwrap()
}

pub async fn start_devnet(config: NodeConfig) -> NodeRuntime {
    let runtime = NodeRuntime::new(config).await.unwrap();
    runtime.start().await.unwrap();
    runtime
}

/// Signed user transaction with `gas_fee_cap = 2` and `gas_tip_cap = 1`.
pub fn user_tx(chain_id: U256, batch_index: u64, nonce: u64, gas: u64) -> Vec<u8> {
    ShutterTx {
        chain_id,
        nonce,
        gas_tip_cap: U256::from(1),
        gas_fee_cap: U256::from(2),
        gas,
        encrypted_payload: vec![0xee; 32],
        batch_index,
        signature: None,
    }
    .sign(&user())
    .unwrap()
    .encode()
    .unwrap()
}

/// Poll `condition` until it holds; panics after `timeout`.
pub async fn wait_until<F: Fn() -> bool>(what: &str, timeout: Duration, condition: F) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
