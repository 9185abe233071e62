//! Decryption keys reconstructed by other keypers.

use async_trait::async_trait;
use rs_01_p2p_schema::{DecryptionKeys, P2PMessage};
use rs_02_p2p_messaging::{
    check_i64, check_instance_id, HandlerError, MessageHandler, MessageValidator,
    ValidationError, ValidationResult,
};
use tracing::debug;

use crate::service::KeyperDependencies;

pub struct KeysHandler {
    deps: KeyperDependencies,
}

impl KeysHandler {
    pub fn new(deps: KeyperDependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl MessageValidator<DecryptionKeys> for KeysHandler {
    async fn validate(&self, message: &DecryptionKeys) -> Result<ValidationResult, ValidationError> {
        check_instance_id(self.deps.settings.instance_id, message.instance_id)?;
        check_i64("eon", message.eon)?;

        let Some(dkg) = self.deps.store.dkg_result(message.eon) else {
            return Err(ValidationError::invalid(format!(
                "no DKG result for eon {}",
                message.eon
            )));
        };
        let Some(dkg) = dkg.success() else {
            return Err(ValidationError::invalid(format!(
                "DKG of eon {} failed",
                message.eon
            )));
        };

        if message.keys.is_empty() {
            return Err(ValidationError::invalid("no keys in message"));
        }
        let max = self.deps.settings.max_num_keys_per_message;
        if message.keys.len() > max {
            return Err(ValidationError::invalid(format!(
                "{} keys exceed the limit of {max}",
                message.keys.len()
            )));
        }
        if !message
            .keys
            .windows(2)
            .all(|pair| pair[0].identity < pair[1].identity)
        {
            return Err(ValidationError::invalid("keys not ordered by identity"));
        }

        for key in &message.keys {
            if self
                .deps
                .store
                .decryption_key(message.eon, &key.identity)
                .is_some_and(|known| known == key.key)
            {
                continue;
            }
            let parsed = key.epoch_secret_key().map_err(|e| {
                ValidationError::invalid(format!("invalid key for {}: {e}", key.identity))
            })?;
            if !dkg.verify_epoch_secret_key(&key.identity, &parsed) {
                return Err(ValidationError::invalid(format!(
                    "key for {} does not match eon public key",
                    key.identity
                )));
            }
        }
        Ok(ValidationResult::Accept)
    }
}

#[async_trait]
impl MessageHandler<DecryptionKeys> for KeysHandler {
    async fn handle(&self, message: &DecryptionKeys) -> Result<Vec<P2PMessage>, HandlerError> {
        let mut inserted = 0;
        for key in &message.keys {
            if self
                .deps
                .store
                .insert_decryption_key(message.eon, &key.identity, key.key.clone())?
            {
                inserted += 1;
            }
        }
        debug!(
            eon = message.eon,
            keys = message.keys.len(),
            inserted,
            "stored decryption keys"
        );
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DkgResult;
    use crate::ports::KeyperStore;
    use crate::testing::{Committee, EON, INSTANCE_ID};
    use rs_01_p2p_schema::Key;
    use shared_types::EpochId;

    fn key(committee: &Committee, epoch: u64) -> Key {
        let identity = EpochId::from_u64(epoch);
        Key {
            identity,
            key: committee
                .dealer
                .epoch_secret_key(identity.as_bytes())
                .unwrap()
                .to_vec(),
        }
    }

    fn message(keys: Vec<Key>) -> DecryptionKeys {
        DecryptionKeys {
            instance_id: INSTANCE_ID,
            eon: EON,
            keys,
        }
    }

    #[tokio::test]
    async fn test_stores_valid_keys() {
        let committee = Committee::new(3, 2);
        let node = committee.keyper(0);
        let handler = KeysHandler::new(node.deps.clone());

        let keys = message(vec![key(&committee, 1), key(&committee, 2)]);
        assert_eq!(handler.validate(&keys).await, Ok(ValidationResult::Accept));
        assert!(handler.handle(&keys).await.unwrap().is_empty());
        assert_eq!(node.store.key_count(), 2);

        // already known keys pass without another pairing check
        assert_eq!(handler.validate(&keys).await, Ok(ValidationResult::Accept));
        handler.handle(&keys).await.unwrap();
        assert_eq!(node.store.key_count(), 2);
    }

    #[tokio::test]
    async fn test_rejects_invalid_keys() {
        let committee = Committee::new(3, 2);
        let node = committee.keyper(0);
        let handler = KeysHandler::new(node.deps.clone());

        // key of epoch 2 claimed for epoch 1
        let mut swapped = key(&committee, 2);
        swapped.identity = EpochId::from_u64(1);
        assert!(handler.validate(&message(vec![swapped])).await.is_err());

        let unordered = message(vec![key(&committee, 2), key(&committee, 1)]);
        assert!(handler.validate(&unordered).await.is_err());

        assert!(handler.validate(&message(Vec::new())).await.is_err());

        let too_many = message((1..=5).map(|e| key(&committee, e)).collect());
        assert!(handler.validate(&too_many).await.is_err());

        let mut other_instance = message(vec![key(&committee, 1)]);
        other_instance.instance_id = INSTANCE_ID + 1;
        assert!(matches!(
            handler.validate(&other_instance).await,
            Err(ValidationError::InstanceIdMismatch { .. })
        ));
        assert_eq!(node.store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_keys_without_successful_dkg() {
        let committee = Committee::new(3, 2);
        let keys = message(vec![key(&committee, 1)]);

        let unknown = committee.node_without_eon(0);
        assert!(matches!(
            KeysHandler::new(unknown.deps.clone()).validate(&keys).await,
            Err(ValidationError::Invalid(_))
        ));

        let failed = committee.node_without_eon(0);
        failed
            .store
            .insert_eon(committee.eon(), DkgResult::Failure { eon: EON })
            .unwrap();
        assert!(matches!(
            KeysHandler::new(failed.deps.clone()).validate(&keys).await,
            Err(ValidationError::Invalid(_))
        ));
        assert_eq!(failed.store.key_count(), 0);
    }
}
