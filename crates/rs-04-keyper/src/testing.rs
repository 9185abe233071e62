//! Fixtures for the service tests: one dealer-generated eon shared by a
//! small keyper committee.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rs_01_p2p_schema::{DecryptionTrigger, P2PMessage};
use rs_02_p2p_messaging::{MessageSender, MessagingError, TransportError};
use shared_crypto::{DealerOutput, Secp256k1KeyPair, ThresholdKeyGen};
use shared_types::{EpochId, InMemoryChainObserver, KeyperSet};

use crate::adapters::InMemoryKeyperStore;
use crate::domain::{DkgResult, Eon, PureDkgResult};
use crate::ports::KeyperStore;
use crate::service::{KeyperDependencies, KeyperSettings};

pub(crate) const INSTANCE_ID: u64 = 42;
pub(crate) const EON: u64 = 1;
pub(crate) const ACTIVATION_BLOCK: u64 = 10;
pub(crate) const KEYPER_CONFIG_INDEX: u64 = 0;
pub(crate) const COLLATOR_KEY: [u8; 32] = [1u8; 32];

pub(crate) fn keyper_key(index: u64) -> Secp256k1KeyPair {
    Secp256k1KeyPair::from_bytes([20 + index as u8; 32]).unwrap()
}

#[derive(Default)]
pub(crate) struct RecordingSender {
    pub messages: Mutex<Vec<P2PMessage>>,
    failures: AtomicU32,
}

impl RecordingSender {
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_message(&self, message: P2PMessage) -> Result<(), MessagingError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::PublishFailed("no peers".to_string()).into());
        }
        self.messages.lock().push(message);
        Ok(())
    }
}

/// A committee of `num_keypers` keypers sharing one eon.
pub(crate) struct Committee {
    pub dealer: DealerOutput,
    pub chain: Arc<InMemoryChainObserver>,
    pub collator: Secp256k1KeyPair,
}

impl Committee {
    pub fn new(num_keypers: u64, threshold: u64) -> Self {
        let dealer = ThresholdKeyGen::new(num_keypers, threshold, 99)
            .unwrap()
            .generate()
            .unwrap();
        let collator = Secp256k1KeyPair::from_bytes(COLLATOR_KEY).unwrap();
        let chain = Arc::new(InMemoryChainObserver::new());
        chain.add_keyper_set(KeyperSet {
            index: KEYPER_CONFIG_INDEX,
            activation_block: ACTIVATION_BLOCK,
            keypers: (0..num_keypers).map(|i| keyper_key(i).address()).collect(),
            threshold,
        });
        chain.add_collator(0, collator.address());
        Self {
            dealer,
            chain,
            collator,
        }
    }

    pub fn eon(&self) -> Eon {
        Eon {
            eon: EON,
            activation_block: ACTIVATION_BLOCK,
            keyper_config_index: KEYPER_CONFIG_INDEX,
        }
    }

    pub fn dkg_result(&self, index: u64) -> DkgResult {
        DkgResult::Success(PureDkgResult::from_dealer(EON, index, &self.dealer).unwrap())
    }

    /// Keyper `index` with the eon already registered.
    pub fn keyper(&self, index: u64) -> Node {
        let node = self.node_without_eon(index);
        node.store.insert_eon(self.eon(), self.dkg_result(index)).unwrap();
        node
    }

    pub fn node_without_eon(&self, index: u64) -> Node {
        let store = Arc::new(InMemoryKeyperStore::new());
        let sender = Arc::new(RecordingSender::default());
        let deps = KeyperDependencies {
            settings: KeyperSettings {
                instance_id: INSTANCE_ID,
                max_num_keys_per_message: 4,
            },
            key: Arc::new(keyper_key(index)),
            store: store.clone(),
            chain: self.chain.clone(),
            sender: sender.clone(),
        };
        Node {
            deps,
            store,
            sender,
        }
    }

    pub fn trigger(&self, epoch: u64, block_number: u64) -> DecryptionTrigger {
        DecryptionTrigger::new_signed(
            INSTANCE_ID,
            EpochId::from_u64(epoch),
            block_number,
            [0xab; 32],
            &self.collator,
        )
        .unwrap()
    }
}

pub(crate) struct Node {
    pub deps: KeyperDependencies,
    pub store: Arc<InMemoryKeyperStore>,
    pub sender: Arc<RecordingSender>,
}
