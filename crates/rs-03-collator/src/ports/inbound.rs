//! # Inbound Port - CollatorApi
//!
//! What a user-facing frontend (JSON-RPC or HTTP server) calls.
//!
//! | Method               | Purpose                                          |
//! |----------------------|--------------------------------------------------|
//! | `submit_transaction` | admit an encrypted transaction into a batch      |
//! | `next_batch`         | epoch id and L1 block users should encrypt for   |
//! | `eon_public_key`     | confirmed eon public key active at an L1 block   |

use async_trait::async_trait;

use crate::domain::TxResultReceiver;
use crate::ports::outbound::{EonPublicKeyCandidate, NextBatch};

/// Primary API of the collator.
///
/// # Example
///
/// ```rust,ignore
/// let receiver = collator.submit_transaction(raw).await;
/// match receiver.wait().await {
///     Ok(()) => println!("included"),
///     Err(rejection) => println!("rejected: {rejection}"),
/// }
/// ```
#[async_trait]
pub trait CollatorApi: Send + Sync {
    /// Admit a raw `ShutterTx`. The receiver resolves exactly once: with
    /// `Ok` once the batch is confirmed, or with the rejection.
    async fn submit_transaction(&self, raw: Vec<u8>) -> TxResultReceiver;

    fn next_batch(&self) -> Option<NextBatch>;

    fn eon_public_key(&self, block: u64) -> Option<EonPublicKeyCandidate>;
}
