//! # Keyper Committee over the Mesh
//!
//! Triggers are injected through the collator's messaging service while the
//! collator itself stays idle, so every share and key seen by the keypers
//! stems from the injected triggers.

use std::time::Duration;

use node_runtime::container::DEVNET_EON;
use node_runtime::NodeRuntime;
use rs_01_p2p_schema::{DecryptionTrigger, P2PMessage};
use rs_02_p2p_messaging::MessageSender;
use rs_04_keyper::{KeyperApi, KeyperStore};
use shared_crypto::{EpochSecretKey, Secp256k1KeyPair, ThresholdKeyGen};
use shared_types::EpochId;

use super::fixtures::{devnet_config, start_devnet, wait_until, IDLE_EPOCH_DURATION_MS};

const TIMEOUT: Duration = Duration::from_secs(15);

async fn inject(runtime: &NodeRuntime, trigger: DecryptionTrigger) {
    runtime
        .container()
        .collator
        .messaging
        .sender()
        .send_message(P2PMessage::DecryptionTrigger(trigger))
        .await
        .unwrap();
}

fn trigger(runtime: &NodeRuntime, epoch: u64, key: &Secp256k1KeyPair) -> DecryptionTrigger {
    let instance_id = runtime.container().config.collator.instance_id;
    DecryptionTrigger::new_signed(instance_id, EpochId::from_u64(epoch), 0, [0xab; 32], key)
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_committee_releases_the_threshold_key() {
    let runtime = start_devnet(devnet_config(IDLE_EPOCH_DURATION_MS)).await;
    let container = runtime.container();
    let collator_key = container.config.collator.signing_key().unwrap();

    inject(&runtime, trigger(&runtime, 100, &collator_key)).await;

    let identity = EpochId::from_u64(100);
    wait_until("every keyper aggregated the key", TIMEOUT, || {
        container
            .keypers
            .iter()
            .all(|node| node.keyper.decryption_key(DEVNET_EON, &identity).is_some())
    })
    .await;

    // same dealer as the devnet, so the key is known in advance
    let devnet = &container.config.devnet;
    let dealer = ThresholdKeyGen::new(devnet.num_keypers, devnet.threshold, devnet.dkg_seed)
        .unwrap()
        .generate()
        .unwrap();
    let expected = dealer.epoch_secret_key(identity.as_bytes()).unwrap();
    for node in &container.keypers {
        let key = node.keyper.decryption_key(DEVNET_EON, &identity).unwrap();
        assert_eq!(key, expected.to_vec(), "keyper {}", node.index);
        let key = EpochSecretKey::from_slice(&key).unwrap();
        assert!(key.verify(identity.as_bytes(), &dealer.eon_public_key));
        assert!(node
            .store
            .key_share_exists(DEVNET_EON, &identity, node.index));
    }

    runtime.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_trigger_from_unregistered_collator_is_dropped() {
    let runtime = start_devnet(devnet_config(IDLE_EPOCH_DURATION_MS)).await;
    let container = runtime.container();
    let impostor = Secp256k1KeyPair::from_bytes([0x66; 32]).unwrap();
    let collator_key = container.config.collator.signing_key().unwrap();

    inject(&runtime, trigger(&runtime, 99, &impostor)).await;
    // a genuine trigger behind it shows the forged one has been processed
    inject(&runtime, trigger(&runtime, 101, &collator_key)).await;

    let genuine = EpochId::from_u64(101);
    wait_until("genuine trigger answered", TIMEOUT, || {
        container
            .keypers
            .iter()
            .all(|node| node.keyper.decryption_key(DEVNET_EON, &genuine).is_some())
    })
    .await;

    let forged = EpochId::from_u64(99);
    for node in &container.keypers {
        assert!(node.store.key_shares(DEVNET_EON, &forged).is_empty());
        assert!(node.store.decryption_key(DEVNET_EON, &forged).is_none());
    }

    runtime.shutdown().await.unwrap();
}
