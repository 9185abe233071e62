//! Canonical hashes and ECDSA signatures of signed messages.
//!
//! ```text
//! trigger : sha3_256( 0x19 "trigger" || u64be(instance_id) || epoch_id || transactions_hash )
//! eonpub  : sha3_256( 0x19 "eonpub"  || u64be(instance_id) || u64be(activation_block)
//!                     || u64be(keyper_config_index) || u64be(eon) || public_key )
//! ```
//!
//! The trigger's block number is not part of its hash.

use sha3::{Digest, Sha3_256};
use shared_crypto::{recover_address, Secp256k1KeyPair};
use shared_types::{Address, EpochId, Hash};

use crate::domain::errors::SchemaError;
use crate::domain::messages::{DecryptionTrigger, EonPublicKey};

const TRIGGER_HASH_PREFIX: &[u8] = b"\x19trigger";
const EON_PUBLIC_KEY_HASH_PREFIX: &[u8] = b"\x19eonpub";

impl DecryptionTrigger {
    /// Build and sign a trigger.
    pub fn new_signed(
        instance_id: u64,
        epoch_id: EpochId,
        block_number: u64,
        transactions_hash: Hash,
        key: &Secp256k1KeyPair,
    ) -> Result<Self, SchemaError> {
        let mut trigger = Self {
            instance_id,
            epoch_id,
            block_number,
            transactions_hash,
            signature: Vec::new(),
        };
        trigger.signature = key.sign_prehash(&trigger.hash())?.to_vec();
        Ok(trigger)
    }

    /// Canonical hash the signature is computed over.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update(TRIGGER_HASH_PREFIX);
        hasher.update(self.instance_id.to_be_bytes());
        hasher.update(self.epoch_id.as_bytes());
        hasher.update(self.transactions_hash);
        hasher.finalize().into()
    }

    /// Address that signed this trigger.
    pub fn recover_signer(&self) -> Result<Address, SchemaError> {
        Ok(recover_address(&self.hash(), &self.signature)?)
    }
}

impl EonPublicKey {
    /// Build and sign an eon public key vote.
    #[allow(clippy::too_many_arguments)]
    pub fn new_signed(
        instance_id: u64,
        public_key: Vec<u8>,
        activation_block: u64,
        keyper_config_index: u64,
        eon: u64,
        keyper_index: u64,
        key: &Secp256k1KeyPair,
    ) -> Result<Self, SchemaError> {
        let mut msg = Self {
            instance_id,
            public_key,
            activation_block,
            keyper_config_index,
            eon,
            keyper_index,
            signature: Vec::new(),
        };
        msg.signature = key.sign_prehash(&msg.hash())?.to_vec();
        Ok(msg)
    }

    /// Canonical hash of the candidate. The keyper index is not part of it,
    /// so all keypers voting for the same key sign the same hash.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update(EON_PUBLIC_KEY_HASH_PREFIX);
        hasher.update(self.instance_id.to_be_bytes());
        hasher.update(self.activation_block.to_be_bytes());
        hasher.update(self.keyper_config_index.to_be_bytes());
        hasher.update(self.eon.to_be_bytes());
        hasher.update(&self.public_key);
        hasher.finalize().into()
    }

    /// Address that signed this vote.
    pub fn recover_signer(&self) -> Result<Address, SchemaError> {
        Ok(recover_address(&self.hash(), &self.signature)?)
    }
}
