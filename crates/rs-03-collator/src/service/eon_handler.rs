//! Eon public key voting.
//!
//! Every keyper of a keyper set announces the eon public key its DKG
//! produced. The collator counts one vote per keyper and candidate hash and
//! treats the key as confirmed once the set's threshold is reached. Only
//! confirmed keys gate batch commits.

use async_trait::async_trait;
use rs_01_p2p_schema::{EonPublicKey, P2PMessage};
use rs_02_p2p_messaging::{
    check_i64, check_instance_id, HandlerError, MessageHandler, MessageValidator,
    ValidationError, ValidationResult,
};
use tracing::{debug, info};

use crate::ports::EonPublicKeyCandidate;
use crate::service::CollatorDependencies;

pub struct EonKeyHandler {
    deps: CollatorDependencies,
}

impl EonKeyHandler {
    pub fn new(deps: CollatorDependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl MessageValidator<EonPublicKey> for EonKeyHandler {
    async fn validate(&self, message: &EonPublicKey) -> Result<ValidationResult, ValidationError> {
        check_instance_id(self.deps.settings.instance_id, message.instance_id)?;
        check_i64("activation_block", message.activation_block)?;
        check_i64("keyper_config_index", message.keyper_config_index)?;
        check_i64("eon", message.eon)?;

        let keyper_set = self
            .deps
            .chain
            .keyper_set(message.keyper_config_index)
            .ok_or_else(|| {
                ValidationError::invalid(format!(
                    "unknown keyper config index {}",
                    message.keyper_config_index
                ))
            })?;
        if keyper_set.activation_block != message.activation_block {
            return Err(ValidationError::invalid(format!(
                "activation block mismatch (want={}, have={})",
                keyper_set.activation_block, message.activation_block
            )));
        }
        shared_crypto::EonPublicKey::from_slice(&message.public_key)
            .map_err(|e| ValidationError::invalid(format!("invalid eon public key: {e}")))?;

        let expected = keyper_set.keyper_at(message.keyper_index).ok_or_else(|| {
            ValidationError::invalid(format!(
                "keyper index {} out of range for {} keypers",
                message.keyper_index,
                keyper_set.keypers.len()
            ))
        })?;
        let signer = message
            .recover_signer()
            .map_err(|e| ValidationError::invalid(format!("invalid signature: {e}")))?;
        if signer != *expected {
            return Err(ValidationError::invalid(format!(
                "signed by 0x{} instead of keyper {}",
                hex::encode(signer),
                message.keyper_index
            )));
        }
        Ok(ValidationResult::Accept)
    }
}

#[async_trait]
impl MessageHandler<EonPublicKey> for EonKeyHandler {
    async fn handle(&self, message: &EonPublicKey) -> Result<Vec<P2PMessage>, HandlerError> {
        let keyper_set = self
            .deps
            .chain
            .keyper_set(message.keyper_config_index)
            .ok_or("keyper set disappeared")?;
        let voter = message.recover_signer()?;
        let candidate = EonPublicKeyCandidate {
            hash: message.hash(),
            eon_public_key: message.public_key.clone(),
            activation_block: message.activation_block,
            keyper_config_index: message.keyper_config_index,
            eon: message.eon,
            confirmed: false,
        };

        if self
            .deps
            .store
            .vote_eon_public_key(candidate, voter, keyper_set.threshold)?
        {
            info!(
                eon = message.eon,
                activation_block = message.activation_block,
                keyper_config_index = message.keyper_config_index,
                "eon public key confirmed"
            );
        } else {
            debug!(
                eon = message.eon,
                keyper_index = message.keyper_index,
                "eon public key vote recorded"
            );
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::CollatorStore;
    use crate::testing::{Fixture, INSTANCE_ID};
    use shared_crypto::{Secp256k1KeyPair, ThresholdKeyGen};
    use shared_types::KeyperSet;

    const ACTIVATION_BLOCK: u64 = 100;

    fn keyper(index: u8) -> Secp256k1KeyPair {
        Secp256k1KeyPair::from_bytes([20 + index; 32]).unwrap()
    }

    fn setup() -> (Fixture, EonKeyHandler, Vec<u8>) {
        let f = Fixture::new();
        f.chain.add_keyper_set(KeyperSet {
            index: 1,
            activation_block: ACTIVATION_BLOCK,
            keypers: (0..3).map(|i| keyper(i).address()).collect(),
            threshold: 2,
        });
        let public_key = ThresholdKeyGen::new(3, 2, 7)
            .unwrap()
            .generate()
            .unwrap()
            .eon_public_key
            .to_vec();
        let handler = EonKeyHandler::new(f.deps.clone());
        (f, handler, public_key)
    }

    fn vote(public_key: &[u8], keyper_index: u64, signer: &Secp256k1KeyPair) -> EonPublicKey {
        EonPublicKey::new_signed(
            INSTANCE_ID,
            public_key.to_vec(),
            ACTIVATION_BLOCK,
            1,
            3,
            keyper_index,
            signer,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_confirmed_after_threshold_votes() {
        let (f, handler, public_key) = setup();

        let first = vote(&public_key, 0, &keyper(0));
        assert_eq!(handler.validate(&first).await, Ok(ValidationResult::Accept));
        handler.handle(&first).await.unwrap();
        // a repeated vote does not count twice
        handler.handle(&first).await.unwrap();
        assert!(f.store.confirmed_eon_public_key(3).is_none());

        let second = vote(&public_key, 2, &keyper(2));
        assert_eq!(handler.validate(&second).await, Ok(ValidationResult::Accept));
        assert!(handler.handle(&second).await.unwrap().is_empty());

        let confirmed = f.store.confirmed_eon_public_key(3).unwrap();
        assert_eq!(confirmed.eon_public_key, public_key);
        assert_eq!(confirmed.hash, first.hash());
        assert!(f
            .store
            .confirmed_eon_public_key_for_block(ACTIVATION_BLOCK)
            .is_some());
        assert!(f
            .store
            .confirmed_eon_public_key_for_block(ACTIVATION_BLOCK - 1)
            .is_none());
    }

    #[tokio::test]
    async fn test_rejects_foreign_signer() {
        let (_f, handler, public_key) = setup();
        let forged = vote(&public_key, 1, &keyper(9));
        assert!(matches!(
            handler.validate(&forged).await,
            Err(ValidationError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_inconsistent_fields() {
        let (_f, handler, public_key) = setup();

        let mut other_instance = vote(&public_key, 0, &keyper(0));
        other_instance.instance_id = INSTANCE_ID + 1;
        assert!(matches!(
            handler.validate(&other_instance).await,
            Err(ValidationError::InstanceIdMismatch { .. })
        ));

        let early = EonPublicKey::new_signed(
            INSTANCE_ID,
            public_key.clone(),
            ACTIVATION_BLOCK - 1,
            1,
            3,
            0,
            &keyper(0),
        )
        .unwrap();
        assert!(handler.validate(&early).await.is_err());

        let out_of_range = vote(&public_key, 3, &keyper(0));
        assert!(handler.validate(&out_of_range).await.is_err());

        let garbage = vote(&[1u8; 96], 0, &keyper(0));
        assert!(handler.validate(&garbage).await.is_err());

        let mut huge = vote(&public_key, 0, &keyper(0));
        huge.eon = u64::MAX;
        assert!(matches!(
            handler.validate(&huge).await,
            Err(ValidationError::IntegerOverflow { field: "eon", .. })
        ));
    }
}
