//! # Encrypted Mempool Flow
//!
//! ```text
//! user ──ShutterTx──► collator ──DecryptionTrigger──► keypers
//!                        ▲                               │ shares
//!                        └──────── DecryptionKeys ◄──────┘
//!                        │
//!                        └──BatchTx──► mock sequencer ──receipt──► user result
//! ```

use std::time::Duration;

use node_runtime::container::DEVNET_EON;
use rs_03_collator::{CollatorApi, TxRejection};
use rs_04_keyper::KeyperApi;
use shared_crypto::{hash_byte_list, EonPublicKey, EpochSecretKey};
use shared_types::EpochId;

use super::fixtures::{devnet_config, start_devnet, user, user_tx, wait_until};

const EPOCH_DURATION_MS: u64 = 250;
const FLOW_TIMEOUT: Duration = Duration::from_secs(20);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_encrypted_transactions_reach_the_sequencer() {
    let runtime = start_devnet(devnet_config(EPOCH_DURATION_MS)).await;
    let container = runtime.container();
    let collator = runtime.collator();
    wait_until("eon public key confirmed", FLOW_TIMEOUT, || {
        collator.eon_public_key(0).is_some()
    })
    .await;

    // one batch ahead so the next epoch tick cannot overtake the submission
    let next = collator.next_batch().unwrap().epoch_id.to_u64().unwrap();
    let target = next + 1;
    let chain_id = container.config.devnet.chain_id;
    let raw0 = user_tx(chain_id, target, 0, 21_000);
    let raw1 = user_tx(chain_id, target, 1, 21_000);
    let rx0 = collator.submit_transaction(raw0.clone()).await;
    let rx1 = collator.submit_transaction(raw1.clone()).await;

    let results = tokio::time::timeout(FLOW_TIMEOUT, async {
        (rx0.wait().await, rx1.wait().await)
    })
    .await
    .expect("transactions resolved");
    assert_eq!(results, (Ok(()), Ok(())));

    let executed = container.sequencer.executed_batches();
    let indices: Vec<u64> = executed.iter().map(|b| b.batch_index).collect();
    let expected: Vec<u64> = (1..=indices.len() as u64).collect();
    assert_eq!(indices, expected, "batches executed in order without gaps");

    let batch = executed
        .iter()
        .find(|b| b.batch_index == target)
        .expect("target batch executed");
    assert_eq!(batch.transactions, vec![raw0.clone(), raw1.clone()]);
    assert_eq!(container.sequencer.account(&user().address()).nonce, 2);

    // the trigger committed to exactly these transactions
    let trigger = container
        .collator
        .store
        .triggers()
        .into_iter()
        .find(|t| t.epoch_id == EpochId::from_u64(target))
        .expect("trigger stored");
    assert_eq!(
        trigger.batch_hash,
        hash_byte_list([
            rs_03_collator::tx_hash(&raw0),
            rs_03_collator::tx_hash(&raw1)
        ])
    );

    // the released key is the committee's threshold key for the batch
    let identity = EpochId::from_u64(target);
    let candidate = collator.eon_public_key(0).unwrap();
    let eon_public_key = EonPublicKey::from_slice(&candidate.eon_public_key).unwrap();
    let key = EpochSecretKey::from_slice(&batch.decryption_key).unwrap();
    assert!(key.verify(identity.as_bytes(), &eon_public_key));
    wait_until("every keyper holds the key", FLOW_TIMEOUT, || {
        container.keypers.iter().all(|node| {
            node.keyper.decryption_key(DEVNET_EON, &identity) == Some(batch.decryption_key.clone())
        })
    })
    .await;

    runtime.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_out_of_window_transactions_are_rejected_on_submission() {
    let runtime = start_devnet(devnet_config(super::fixtures::IDLE_EPOCH_DURATION_MS)).await;
    let container = runtime.container();
    let collator = runtime.collator();
    let chain_id = container.config.devnet.chain_id;
    let next = collator.next_batch().unwrap().epoch_id.to_u64().unwrap();
    let interval = container.config.collator.batch_index_acceptance_interval;

    let historic = collator
        .submit_transaction(user_tx(chain_id, next - 1, 0, 21_000))
        .await
        .wait()
        .await
        .unwrap_err();
    assert!(historic.to_string().contains("historic batch index"));

    let future = collator
        .submit_transaction(user_tx(chain_id, next + interval + 1, 0, 21_000))
        .await
        .wait()
        .await
        .unwrap_err();
    assert!(future.to_string().contains("batch too far in the future"));

    let foreign = collator
        .submit_transaction(user_tx(chain_id + 1, next, 0, 21_000))
        .await
        .wait()
        .await;
    assert!(matches!(foreign, Err(TxRejection::WrongChainId { .. })));

    assert!(container.collator.store.transactions().is_empty());
    runtime.shutdown().await.unwrap();
}
