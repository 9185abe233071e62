//! User-facing JSON-RPC server over [`CollatorApi`].
//!
//! | Method                     | Params         | Result                   |
//! |----------------------------|----------------|--------------------------|
//! | `shutter_submitTransaction`| raw tx hex     | tx hash hex              |
//! | `shutter_nextBatch`        |                | `RpcNextBatch` or null   |
//! | `shutter_eonPublicKey`     | L1 block       | `RpcEonPublicKey` or null|
//!
//! `shutter_submitTransaction` answers once the transaction is admitted into
//! a batch. Admission failures are returned as errors, the final batch
//! outcome is not awaited.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{tx_hash, CollatorError, TxRejection};
use crate::ports::{CollatorApi, EonPublicKeyCandidate, NextBatch};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcNextBatch {
    pub epoch_id: String,
    pub l1_block_number: u64,
}

impl From<NextBatch> for RpcNextBatch {
    fn from(next: NextBatch) -> Self {
        Self {
            epoch_id: hex_data(next.epoch_id.as_bytes()),
            l1_block_number: next.l1_block_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcEonPublicKey {
    pub instance_id: u64,
    pub eon: u64,
    pub eon_public_key: String,
    pub activation_block: u64,
    pub keyper_config_index: u64,
}

impl RpcEonPublicKey {
    fn new(instance_id: u64, candidate: EonPublicKeyCandidate) -> Self {
        Self {
            instance_id,
            eon: candidate.eon,
            eon_public_key: hex_data(&candidate.eon_public_key),
            activation_block: candidate.activation_block,
            keyper_config_index: candidate.keyper_config_index,
        }
    }
}

#[rpc(server, namespace = "shutter")]
pub trait CollatorRpc {
    /// Admit a hex encoded `ShutterTx` and return its hash.
    #[method(name = "submitTransaction")]
    async fn submit_transaction(&self, raw: String) -> RpcResult<String>;

    /// Epoch and L1 block users should encrypt for.
    #[method(name = "nextBatch")]
    fn next_batch(&self) -> RpcResult<Option<RpcNextBatch>>;

    /// Confirmed eon public key active at `block`.
    #[method(name = "eonPublicKey")]
    fn eon_public_key(&self, block: u64) -> RpcResult<Option<RpcEonPublicKey>>;
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error(transparent)]
    Rejected(#[from] TxRejection),
}

impl RpcError {
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidHex(_) => jsonrpsee::types::error::INVALID_PARAMS_CODE,
            Self::Rejected(TxRejection::Unavailable(_)) => 1002,
            Self::Rejected(_) => 1001,
        }
    }
}

impl From<RpcError> for ErrorObjectOwned {
    fn from(e: RpcError) -> Self {
        ErrorObjectOwned::owned::<serde_json::Value>(e.code(), e.to_string(), None)
    }
}

#[derive(Clone)]
pub struct CollatorRpcImpl {
    api: Arc<dyn CollatorApi>,
    instance_id: u64,
}

impl CollatorRpcImpl {
    pub fn new(api: Arc<dyn CollatorApi>, instance_id: u64) -> Self {
        Self { api, instance_id }
    }
}

#[async_trait]
impl CollatorRpcServer for CollatorRpcImpl {
    async fn submit_transaction(&self, raw: String) -> RpcResult<String> {
        let raw = hex::decode(raw.trim_start_matches("0x"))
            .map_err(|e| RpcError::InvalidHex(e.to_string()))?;
        let hash = tx_hash(&raw);
        let mut receiver = self.api.submit_transaction(raw).await;
        if let Some(Err(rejection)) = receiver.try_result() {
            debug!(error = %rejection, "rpc transaction rejected");
            return Err(RpcError::Rejected(rejection).into());
        }
        Ok(hex_data(&hash))
    }

    fn next_batch(&self) -> RpcResult<Option<RpcNextBatch>> {
        Ok(self.api.next_batch().map(RpcNextBatch::from))
    }

    fn eon_public_key(&self, block: u64) -> RpcResult<Option<RpcEonPublicKey>> {
        Ok(self
            .api
            .eon_public_key(block)
            .map(|candidate| RpcEonPublicKey::new(self.instance_id, candidate)))
    }
}

/// Bind `address` and serve `api`. The server runs until the handle is
/// stopped or dropped.
pub async fn start_rpc_server(
    api: Arc<dyn CollatorApi>,
    instance_id: u64,
    address: &str,
) -> Result<(SocketAddr, ServerHandle), CollatorError> {
    let server = ServerBuilder::new()
        .build(address)
        .await
        .map_err(|e| CollatorError::Config(format!("rpc server on {address}: {e}")))?;
    let local = server
        .local_addr()
        .map_err(|e| CollatorError::Config(format!("rpc server address: {e}")))?;
    let handle = server.start(CollatorRpcImpl::new(api, instance_id).into_rpc());
    info!(address = %local, "collator rpc server started");
    Ok((local, handle))
}

fn hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
