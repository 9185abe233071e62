//! # Keyper Services
//!
//! | Component           | Topic / task           | Effect                                         |
//! |---------------------|------------------------|------------------------------------------------|
//! | `TriggerHandler`    | `decryptionTrigger`    | computes and publishes the own key share       |
//! | `SharesHandler`     | `decryptionKeyShares`  | stores peer shares, publishes aggregated keys  |
//! | `KeysHandler`       | `decryptionKeys`       | stores keys reconstructed by peers             |
//! | `EonKeyHandler`     | `eonPublicKey`         | checks peer announcements against the own DKG  |
//! | `EonPublisher`      | background task        | announces the public key of each new eon       |
//! | `EpochKeyGenerator` | shared                 | share computation and aggregation              |

use std::sync::Arc;

use rs_02_p2p_messaging::MessageSender;
use shared_crypto::Secp256k1KeyPair;
use shared_types::ChainObserver;

use crate::ports::KeyperStore;

pub mod eon_handler;
pub mod eon_publisher;
pub mod key_generation;
pub mod keyper;
pub mod keys_handler;
pub mod shares_handler;
pub mod trigger_handler;

pub use eon_handler::EonKeyHandler;
pub use eon_publisher::EonPublisher;
pub use key_generation::EpochKeyGenerator;
pub use keyper::Keyper;
pub use keys_handler::KeysHandler;
pub use shares_handler::SharesHandler;
pub use trigger_handler::TriggerHandler;

#[derive(Debug, Clone)]
pub struct KeyperSettings {
    pub instance_id: u64,
    /// Upper bound for shares or keys in one message.
    pub max_num_keys_per_message: usize,
}

/// Ports and identity the keyper services are built from.
#[derive(Clone)]
pub struct KeyperDependencies {
    pub settings: KeyperSettings,
    pub key: Arc<Secp256k1KeyPair>,
    pub store: Arc<dyn KeyperStore>,
    pub chain: Arc<dyn ChainObserver>,
    pub sender: Arc<dyn MessageSender>,
}
