//! JSON-RPC sequencer and L1 clients.
//!
//! | Port method           | RPC                                     |
//! |-----------------------|-----------------------------------------|
//! | `chain_id`            | `eth_chainId`                           |
//! | `latest_block`        | `eth_getBlockByNumber("latest", false)` |
//! | `balance`             | `eth_getBalance(addr, "latest")`        |
//! | `nonce`               | `eth_getTransactionCount(addr, "latest")` |
//! | `batch_index`         | `shutter_batchIndex`                    |
//! | `submit_batch`        | `shutter_submitBatch(raw_hex)`          |
//! | `transaction_receipt` | `eth_getTransactionReceipt(hash)`       |
//! | `block_number` (L1)   | `eth_blockNumber`                       |

use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use primitive_types::{H160, H256};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared_types::{Address, Hash, U256};
use tracing::trace;

use crate::domain::{BlockContext, SequencerError};
use crate::ports::{L1BlockSource, Sequencer, TransactionReceipt};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: U256,
    #[serde(default)]
    base_fee_per_gas: Option<U256>,
    gas_limit: U256,
    miner: H160,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: H256,
    #[serde(default)]
    block_number: Option<U256>,
    #[serde(default)]
    status: Option<U256>,
}

fn params<I, T>(values: I) -> Result<ArrayParams, SequencerError>
where
    I: IntoIterator<Item = T>,
    T: Serialize,
{
    let mut params = ArrayParams::new();
    for value in values {
        params
            .insert(value)
            .map_err(|e| SequencerError::Rpc {
                method: "encode",
                reason: e.to_string(),
            })?;
    }
    Ok(params)
}

fn to_u64(method: &'static str, value: U256) -> Result<u64, SequencerError> {
    if value > U256::from(u64::MAX) {
        return Err(SequencerError::InvalidResponse {
            method,
            reason: format!("{value} does not fit u64"),
        });
    }
    Ok(value.as_u64())
}

fn hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Client for an Ethereum style JSON-RPC endpoint with the `shutter_*`
/// extensions. Used both for the sequencer and, through
/// [`L1BlockSource`], for the L1 node.
#[derive(Debug, Clone)]
pub struct JsonRpcSequencer {
    url: String,
    client: HttpClient,
}

impl JsonRpcSequencer {
    pub fn new(url: &str) -> Result<Self, SequencerError> {
        let client = HttpClientBuilder::default()
            .build(url)
            .map_err(|e| SequencerError::Rpc {
                method: "connect",
                reason: e.to_string(),
            })?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: ArrayParams,
    ) -> Result<R, SequencerError> {
        trace!(url = %self.url, method, "rpc call");
        self.client
            .request(method, params)
            .await
            .map_err(|e| SequencerError::Rpc {
                method,
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Sequencer for JsonRpcSequencer {
    async fn chain_id(&self) -> Result<U256, SequencerError> {
        self.call("eth_chainId", ArrayParams::new()).await
    }

    async fn latest_block(&self) -> Result<BlockContext, SequencerError> {
        let method = "eth_getBlockByNumber";
        let block: Option<RpcBlock> = self
            .call(method, params([serde_json::json!("latest"), serde_json::json!(false)])?)
            .await?;
        let block = block.ok_or_else(|| SequencerError::InvalidResponse {
            method,
            reason: "no latest block".to_string(),
        })?;
        Ok(BlockContext {
            number: to_u64(method, block.number)?,
            base_fee: block.base_fee_per_gas.unwrap_or_default(),
            gas_limit: to_u64(method, block.gas_limit)?,
            coinbase: block.miner.0,
        })
    }

    async fn balance(&self, address: Address) -> Result<U256, SequencerError> {
        self.call("eth_getBalance", params([hex_data(&address), "latest".to_string()])?)
            .await
    }

    async fn nonce(&self, address: Address) -> Result<u64, SequencerError> {
        let method = "eth_getTransactionCount";
        let nonce: U256 = self
            .call(method, params([hex_data(&address), "latest".to_string()])?)
            .await?;
        to_u64(method, nonce)
    }

    async fn batch_index(&self) -> Result<u64, SequencerError> {
        let method = "shutter_batchIndex";
        let index: U256 = self.call(method, ArrayParams::new()).await?;
        to_u64(method, index)
    }

    async fn submit_batch(&self, raw: Vec<u8>) -> Result<Hash, SequencerError> {
        let hash: H256 = self
            .call("shutter_submitBatch", params([hex_data(&raw)])?)
            .await?;
        Ok(hash.0)
    }

    async fn transaction_receipt(
        &self,
        tx_hash: Hash,
    ) -> Result<Option<TransactionReceipt>, SequencerError> {
        let method = "eth_getTransactionReceipt";
        let receipt: Option<RpcReceipt> = self.call(method, params([hex_data(&tx_hash)])?).await?;
        let Some(receipt) = receipt else {
            return Ok(None);
        };
        let Some(block_number) = receipt.block_number else {
            return Ok(None);
        };
        Ok(Some(TransactionReceipt {
            tx_hash: receipt.transaction_hash.0,
            block_number: to_u64(method, block_number)?,
            status: receipt.status.is_some_and(|s| s == U256::one()),
        }))
    }
}

#[async_trait]
impl L1BlockSource for JsonRpcSequencer {
    async fn block_number(&self) -> Result<u64, SequencerError> {
        let method = "eth_blockNumber";
        let number: U256 = self.call(method, ArrayParams::new()).await?;
        to_u64(method, number)
    }
}
