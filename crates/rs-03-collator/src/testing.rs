//! Fixtures for the service tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rs_01_p2p_schema::P2PMessage;
use rs_02_p2p_messaging::{MessageSender, MessagingError, TransportError};
use shared_crypto::Secp256k1KeyPair;
use shared_types::{InMemoryChainObserver, RetryOptions, U256};
use tokio::sync::watch;

use crate::adapters::{InMemoryCollatorStore, MockSequencer};
use crate::domain::ShutterTx;
use crate::ports::{CollatorStore, EonPublicKeyCandidate, TimeSource};
use crate::service::{CollatorDependencies, CollatorSettings, Wakeups};

pub(crate) const INSTANCE_ID: u64 = 42;
pub(crate) const CHAIN_ID: u64 = 1;
pub(crate) const COLLATOR_KEY: [u8; 32] = [1u8; 32];
pub(crate) const USER_KEY: [u8; 32] = [7u8; 32];
pub(crate) const INITIAL_BALANCE: u64 = 210_000;
pub(crate) const GAS_LIMIT: u64 = 210_000;
pub(crate) const TIMESTAMP: u64 = 1_700_000_000;

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

pub(crate) struct FixedTime(pub u64);

impl TimeSource for FixedTime {
    fn now(&self) -> u64 {
        self.0
    }
}

pub(crate) struct Fixture {
    pub deps: CollatorDependencies,
    pub sequencer: Arc<MockSequencer>,
    pub store: Arc<InMemoryCollatorStore>,
    pub chain: Arc<InMemoryChainObserver>,
    pub sender: Arc<RecordingSender>,
    pub user: Secp256k1KeyPair,
    pub wakeups: Wakeups,
    pub shutdown: watch::Sender<bool>,
}

impl Fixture {
    pub fn new() -> Self {
        let key = Arc::new(Secp256k1KeyPair::from_bytes(COLLATOR_KEY).unwrap());
        let user = Secp256k1KeyPair::from_bytes(USER_KEY).unwrap();
        let sequencer = Arc::new(MockSequencer::new(
            U256::from(CHAIN_ID),
            key.address(),
            U256::one(),
            GAS_LIMIT,
        ));
        sequencer.set_balance(user.address(), U256::from(INITIAL_BALANCE));
        let store = Arc::new(InMemoryCollatorStore::new());
        let chain = Arc::new(InMemoryChainObserver::new());
        let sender = Arc::new(RecordingSender::default());
        let (shutdown, _) = watch::channel(false);

        let deps = CollatorDependencies {
            settings: CollatorSettings {
                instance_id: INSTANCE_ID,
                execution_block_delay: 5,
                batch_index_acceptance_interval: 5,
                epoch_duration: Duration::from_secs(3600),
                rpc_retry: RetryOptions::default()
                    .number_of_retries(2)
                    .interval(Duration::from_millis(10)),
            },
            key,
            sequencer: sequencer.clone(),
            l1: sequencer.clone(),
            store: store.clone(),
            chain: chain.clone(),
            time: Arc::new(FixedTime(TIMESTAMP)),
            sender: sender.clone(),
        };

        Self {
            deps,
            sequencer,
            store,
            chain,
            sender,
            user,
            wakeups: Wakeups::default(),
            shutdown,
        }
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Store a confirmed eon key active from `activation_block`.
    pub fn confirm_eon_key(&self, eon: u64, activation_block: u64) -> EonPublicKeyCandidate {
        let candidate = EonPublicKeyCandidate {
            hash: [eon as u8; 32],
            eon_public_key: vec![eon as u8; 96],
            activation_block,
            keyper_config_index: 0,
            eon,
            confirmed: false,
        };
        self.store
            .vote_eon_public_key(candidate.clone(), [9u8; 20], 1)
            .unwrap();
        EonPublicKeyCandidate {
            confirmed: true,
            ..candidate
        }
    }

    /// Signed user transaction with `gas_fee_cap = 2`, `gas_tip_cap = 1`.
    pub fn tx(&self, batch_index: u64, nonce: u64, gas: u64) -> Vec<u8> {
        ShutterTx {
            chain_id: U256::from(CHAIN_ID),
            nonce,
            gas_tip_cap: U256::from(1),
            gas_fee_cap: U256::from(2),
            gas,
            encrypted_payload: vec![0xee; 16],
            batch_index,
            signature: None,
        }
        .sign(&self.user)
        .unwrap()
        .encode()
        .unwrap()
    }
}

/// Poll `condition` until it holds; panics after two seconds.
pub(crate) async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
