//! # Standalone Nodes
//!
//! A keyper and a collator started as separate runtimes on loopback libp2p,
//! the collator talking to a JSON-RPC sequencer and taking transactions
//! over its own JSON-RPC API.
//!
//! ```text
//! user ──rpc──► collator ──libp2p──► keyper
//!                  │   ▲                │
//!                  │   └──── keys ◄─────┘
//!                  └──json-rpc──► sequencer (mock behind a server)
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::RpcResult;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::rpc_params;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use node_runtime::{CollatorNodeConfig, CollatorRuntime, KeyperNodeConfig, KeyperRuntime};
use rs_02_p2p_messaging::{GossipTransport, P2pKey};
use rs_03_collator::adapters::rpc_server::{RpcEonPublicKey, RpcNextBatch};
use rs_03_collator::{L1BlockSource, MockSequencer, Sequencer};
use serde_json::{json, Value};
use shared_crypto::Secp256k1KeyPair;
use shared_types::{address_from_hex, format_address, EpochId, Hash, U256};
use shutter_telemetry::TelemetryConfig;

use super::fixtures::{user, user_tx};

const CHAIN_ID: u64 = 1337;
const COLLATOR_KEY: [u8; 32] = [0x01; 32];
const KEYPER_KEY: [u8; 32] = [0x10; 32];
const KEYPER_P2P_SEED: [u8; 32] = [0x21; 32];
const COLLATOR_P2P_SEED: [u8; 32] = [0x22; 32];
const EPOCH_DURATION_MS: u64 = 500;
const FLOW_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// SEQUENCER SERVER
// =============================================================================

#[rpc(server)]
trait SequencerRpc {
    #[method(name = "eth_chainId")]
    async fn chain_id(&self) -> RpcResult<U256>;

    #[method(name = "eth_blockNumber")]
    async fn block_number(&self) -> RpcResult<U256>;

    #[method(name = "eth_getBlockByNumber")]
    async fn block_by_number(&self, tag: String, full: bool) -> RpcResult<Value>;

    #[method(name = "eth_getBalance")]
    async fn balance(&self, address: String, tag: String) -> RpcResult<U256>;

    #[method(name = "eth_getTransactionCount")]
    async fn transaction_count(&self, address: String, tag: String) -> RpcResult<U256>;

    #[method(name = "eth_getTransactionReceipt")]
    async fn transaction_receipt(&self, hash: String) -> RpcResult<Value>;

    #[method(name = "shutter_batchIndex")]
    async fn batch_index(&self) -> RpcResult<U256>;

    #[method(name = "shutter_submitBatch")]
    async fn submit_batch(&self, raw: String) -> RpcResult<String>;
}

/// Serves a [`MockSequencer`] over the Ethereum style JSON-RPC surface.
struct SequencerServer(Arc<MockSequencer>);

fn rpc_error(e: impl ToString) -> ErrorObjectOwned {
    ErrorObjectOwned::owned::<Value>(-32000, e.to_string(), None)
}

fn decode_hex(value: &str) -> RpcResult<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x")).map_err(rpc_error)
}

fn hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[async_trait]
impl SequencerRpcServer for SequencerServer {
    async fn chain_id(&self) -> RpcResult<U256> {
        self.0.chain_id().await.map_err(rpc_error)
    }

    async fn block_number(&self) -> RpcResult<U256> {
        L1BlockSource::block_number(self.0.as_ref())
            .await
            .map(U256::from)
            .map_err(rpc_error)
    }

    async fn block_by_number(&self, _tag: String, _full: bool) -> RpcResult<Value> {
        let block = self.0.latest_block().await.map_err(rpc_error)?;
        Ok(json!({
            "number": U256::from(block.number),
            "baseFeePerGas": block.base_fee,
            "gasLimit": U256::from(block.gas_limit),
            "miner": format_address(&block.coinbase),
        }))
    }

    async fn balance(&self, address: String, _tag: String) -> RpcResult<U256> {
        let address = address_from_hex(&address).map_err(rpc_error)?;
        self.0.balance(address).await.map_err(rpc_error)
    }

    async fn transaction_count(&self, address: String, _tag: String) -> RpcResult<U256> {
        let address = address_from_hex(&address).map_err(rpc_error)?;
        self.0
            .nonce(address)
            .await
            .map(U256::from)
            .map_err(rpc_error)
    }

    async fn transaction_receipt(&self, hash: String) -> RpcResult<Value> {
        let hash: Hash = decode_hex(&hash)?
            .try_into()
            .map_err(|_| rpc_error("hash must be 32 bytes"))?;
        let receipt = self
            .0
            .transaction_receipt(hash)
            .await
            .map_err(rpc_error)?;
        Ok(match receipt {
            Some(receipt) => json!({
                "transactionHash": hex_data(&receipt.tx_hash),
                "blockNumber": U256::from(receipt.block_number),
                "status": U256::from(u64::from(receipt.status)),
            }),
            None => Value::Null,
        })
    }

    async fn batch_index(&self) -> RpcResult<U256> {
        self.0.batch_index().await.map(U256::from).map_err(rpc_error)
    }

    async fn submit_batch(&self, raw: String) -> RpcResult<String> {
        let raw = decode_hex(&raw)?;
        let hash = self.0.submit_batch(raw).await.map_err(rpc_error)?;
        Ok(hex_data(&hash))
    }
}

async fn start_sequencer(sequencer: Arc<MockSequencer>) -> (SocketAddr, ServerHandle) {
    let server = ServerBuilder::new().build("127.0.0.1:0").await.unwrap();
    let address = server.local_addr().unwrap();
    (address, server.start(SequencerServer(sequencer).into_rpc()))
}

// =============================================================================
// NODES
// =============================================================================

fn address(key: [u8; 32]) -> String {
    format_address(&Secp256k1KeyPair::from_bytes(key).unwrap().address())
}

fn lookup(vars: Vec<(String, String)>) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars.into_iter().collect();
    move |key| vars.get(key).cloned()
}

/// One keyper with threshold one, so it releases keys on its own.
fn committee_vars() -> Vec<(String, String)> {
    vec![
        ("RS_COMMITTEE_KEYPERS".to_string(), address(KEYPER_KEY)),
        ("RS_COMMITTEE_THRESHOLD".to_string(), "1".to_string()),
        ("RS_COMMITTEE_COLLATOR".to_string(), address(COLLATOR_KEY)),
    ]
}

fn p2p_vars(prefix: &str, seed: [u8; 32], bootstrap: String) -> Vec<(String, String)> {
    vec![
        (format!("{prefix}_P2P_KEY"), hex::encode(seed)),
        (
            format!("{prefix}_P2P_LISTEN_ADDRESSES"),
            "/ip4/127.0.0.1/tcp/0".to_string(),
        ),
        (format!("{prefix}_P2P_ENVIRONMENT"), "local".to_string()),
        (format!("{prefix}_P2P_BOOTSTRAP_ADDRESSES"), bootstrap),
    ]
}

/// The keyper is the bootstrap node of the pair.
async fn start_keyper() -> KeyperRuntime {
    let own = format!(
        "/ip4/127.0.0.1/tcp/0/p2p/{}",
        P2pKey::from_seed(KEYPER_P2P_SEED).peer_id()
    );
    let mut vars = committee_vars();
    vars.extend(p2p_vars("RS_KEYPER", KEYPER_P2P_SEED, own));
    vars.push(("RS_KEYPER_ETHEREUM_KEY".to_string(), hex::encode(KEYPER_KEY)));

    let config = KeyperNodeConfig::from_lookup(TelemetryConfig::default(), lookup(vars)).unwrap();
    let runtime = KeyperRuntime::new(config).await.unwrap();
    runtime.start().await.unwrap();
    runtime
}

async fn start_collator(keyper: &KeyperRuntime, sequencer: SocketAddr) -> (CollatorRuntime, HttpClient) {
    let transport = &keyper.container().transport;
    let bootstrap = format!(
        "{}/p2p/{}",
        transport.listen_addresses()[0],
        transport.local_peer_id()
    );
    let url = format!("http://{sequencer}");
    let mut vars = committee_vars();
    vars.extend(p2p_vars("RS_COLLATOR", COLLATOR_P2P_SEED, bootstrap));
    vars.extend([
        ("RS_COLLATOR_ETHEREUM_KEY".to_string(), hex::encode(COLLATOR_KEY)),
        ("RS_COLLATOR_SEQUENCER_URL".to_string(), url.clone()),
        ("RS_COLLATOR_ETHEREUM_URL".to_string(), url),
        ("RS_COLLATOR_RPC_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        (
            "RS_COLLATOR_EPOCH_DURATION_MS".to_string(),
            EPOCH_DURATION_MS.to_string(),
        ),
    ]);

    let config = CollatorNodeConfig::from_lookup(TelemetryConfig::default(), lookup(vars)).unwrap();
    let runtime = CollatorRuntime::new(config).await.unwrap();
    let rpc = runtime.start().await.unwrap();
    let client = HttpClientBuilder::default()
        .build(format!("http://{rpc}"))
        .unwrap();
    (runtime, client)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_standalone_collator_and_keyper_execute_a_batch() {
    let collator_address = Secp256k1KeyPair::from_bytes(COLLATOR_KEY).unwrap().address();
    let sequencer = Arc::new(MockSequencer::new(
        U256::from(CHAIN_ID),
        collator_address,
        U256::one(),
        30_000_000,
    ));
    sequencer.set_balance(user().address(), U256::from(1_000_000_000_000_000_000u64));
    let (sequencer_address, _server) = start_sequencer(Arc::clone(&sequencer)).await;

    let keyper = start_keyper().await;
    let (collator, client) = start_collator(&keyper, sequencer_address).await;

    // the keyper announces the eon over libp2p, one vote confirms it
    tokio::time::timeout(FLOW_TIMEOUT, async {
        loop {
            let eon: Option<RpcEonPublicKey> = client
                .request("shutter_eonPublicKey", rpc_params![0u64])
                .await
                .unwrap();
            if eon.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("eon public key confirmed");

    let next: Option<RpcNextBatch> = client
        .request("shutter_nextBatch", rpc_params![])
        .await
        .unwrap();
    let next = EpochId::from_hex(&next.unwrap().epoch_id).unwrap().to_u64().unwrap();
    let target = next + 1;
    let raw = user_tx(U256::from(CHAIN_ID), target, 0, 21_000);
    let hash: String = client
        .request("shutter_submitTransaction", rpc_params![hex_data(&raw)])
        .await
        .unwrap();
    assert_eq!(hash, hex_data(&rs_03_collator::tx_hash(&raw)));

    tokio::time::timeout(FLOW_TIMEOUT, async {
        while !sequencer
            .executed_batches()
            .iter()
            .any(|b| b.batch_index == target)
        {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("batch executed by the sequencer");

    let batch = sequencer
        .executed_batches()
        .into_iter()
        .find(|b| b.batch_index == target)
        .unwrap();
    assert_eq!(batch.transactions, vec![raw]);
    assert_eq!(sequencer.account(&user().address()).nonce, 1);
    assert!(collator
        .container()
        .transport
        .connected_peers()
        .contains(&keyper.container().transport.local_peer_id()));

    collator.shutdown().await.unwrap();
    keyper.shutdown().await.unwrap();
}
