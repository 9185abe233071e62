//! Key shares published by other keypers.
//!
//! A keyper publishes one share per triggered epoch, but a message may batch
//! up to `max_num_keys_per_message` shares so that catch-up traffic after a
//! restart fits into a single message. Every entry is verified on its own.

use std::sync::Arc;

use async_trait::async_trait;
use rs_01_p2p_schema::{DecryptionKeyShares, Message, P2PMessage};
use rs_02_p2p_messaging::{
    check_i64, check_instance_id, HandlerError, MessageHandler, MessageValidator,
    ValidationError, ValidationResult,
};
use tracing::debug;

use crate::domain::DecryptionKeyShare;
use crate::service::{EpochKeyGenerator, KeyperDependencies};

pub struct SharesHandler {
    deps: KeyperDependencies,
    generator: Arc<EpochKeyGenerator>,
}

impl SharesHandler {
    pub fn new(deps: KeyperDependencies, generator: Arc<EpochKeyGenerator>) -> Self {
        Self { deps, generator }
    }
}

#[async_trait]
impl MessageValidator<DecryptionKeyShares> for SharesHandler {
    async fn validate(
        &self,
        message: &DecryptionKeyShares,
    ) -> Result<ValidationResult, ValidationError> {
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

        if message.shares.is_empty() {
            return Err(ValidationError::invalid("no key shares in message"));
        }
        let max = self.deps.settings.max_num_keys_per_message;
        if message.shares.len() > max {
            return Err(ValidationError::invalid(format!(
                "{} key shares exceed the limit of {max}",
                message.shares.len()
            )));
        }
        if message.keyper_index >= dkg.num_keypers {
            return Err(ValidationError::invalid(format!(
                "keyper index {} out of range for {} keypers",
                message.keyper_index, dkg.num_keypers
            )));
        }
        if !message
            .shares
            .windows(2)
            .all(|pair| pair[0].epoch_id < pair[1].epoch_id)
        {
            return Err(ValidationError::invalid(
                "key shares not ordered by epoch id",
            ));
        }

        for share in &message.shares {
            let parsed = share.epoch_secret_key_share().map_err(|e| {
                ValidationError::invalid(format!("invalid key share for {}: {e}", share.epoch_id))
            })?;
            if !dkg.verify_epoch_secret_key_share(message.keyper_index, &share.epoch_id, &parsed) {
                return Err(ValidationError::invalid(format!(
                    "key share of keyper {} for {} does not verify",
                    message.keyper_index, share.epoch_id
                )));
            }
        }
        Ok(ValidationResult::Accept)
    }
}

#[async_trait]
impl MessageHandler<DecryptionKeyShares> for SharesHandler {
    async fn handle(&self, message: &DecryptionKeyShares) -> Result<Vec<P2PMessage>, HandlerError> {
        let stored: Vec<DecryptionKeyShare> = message
            .shares
            .iter()
            .map(|share| DecryptionKeyShare {
                eon: message.eon,
                identity: share.epoch_id,
                keyper_index: message.keyper_index,
                share: share.share.clone(),
            })
            .collect();
        let inserted = self.deps.store.insert_key_shares(&stored)?;
        if inserted == 0 {
            debug!(
                eon = message.eon,
                keyper_index = message.keyper_index,
                "key shares already known"
            );
            return Ok(Vec::new());
        }

        let keys = self
            .generator
            .aggregate(message.eon, message.shares.iter().map(|s| s.epoch_id))?;
        Ok(keys.into_iter().map(Message::into_p2p).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DkgResult;
    use crate::ports::KeyperStore;
    use crate::testing::{Committee, Node, ACTIVATION_BLOCK, EON, INSTANCE_ID};
    use shared_types::EpochId;

    fn handler(node: &Node) -> SharesHandler {
        let generator = Arc::new(EpochKeyGenerator::new(node.deps.clone()));
        SharesHandler::new(node.deps.clone(), generator)
    }

    fn shares_of(committee: &Committee, index: u64, epochs: &[u64]) -> DecryptionKeyShares {
        let peer = committee.keyper(index);
        let ids: Vec<_> = epochs.iter().copied().map(EpochId::from_u64).collect();
        EpochKeyGenerator::new(peer.deps.clone())
            .compute_key_shares(ACTIVATION_BLOCK, &ids)
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_aggregates_once_threshold_reached() {
        let committee = Committee::new(3, 2);
        let node = committee.keyper(0);
        let handler = handler(&node);

        let first = shares_of(&committee, 1, &[4]);
        assert_eq!(handler.validate(&first).await, Ok(ValidationResult::Accept));
        assert!(handler.handle(&first).await.unwrap().is_empty());

        let second = shares_of(&committee, 2, &[4]);
        assert_eq!(handler.validate(&second).await, Ok(ValidationResult::Accept));
        let out = handler.handle(&second).await.unwrap();
        let [P2PMessage::DecryptionKeys(keys)] = out.as_slice() else {
            panic!("expected one keys message, got {out:?}");
        };
        assert_eq!(keys.instance_id, INSTANCE_ID);
        assert_eq!(keys.eon, EON);
        assert_eq!(keys.keys[0].identity, EpochId::from_u64(4));

        // redelivery is a no-op
        assert!(handler.handle(&second).await.unwrap().is_empty());
        assert_eq!(node.store.key_count(), 1);
    }

    #[tokio::test]
    async fn test_rejects_bad_shares() {
        let committee = Committee::new(3, 2);
        let node = committee.keyper(0);
        let handler = handler(&node);

        let mut misattributed = shares_of(&committee, 1, &[4]);
        misattributed.keyper_index = 2;
        assert!(handler.validate(&misattributed).await.is_err());

        let mut out_of_range = shares_of(&committee, 1, &[4]);
        out_of_range.keyper_index = 3;
        assert!(handler.validate(&out_of_range).await.is_err());

        let mut unordered = shares_of(&committee, 1, &[4, 5]);
        unordered.shares.reverse();
        assert!(handler.validate(&unordered).await.is_err());

        let mut empty = shares_of(&committee, 1, &[4]);
        empty.shares.clear();
        assert!(handler.validate(&empty).await.is_err());

        // fixture limit is 4
        let too_many = shares_of(&committee, 1, &[1, 2, 3, 4, 5]);
        assert!(handler.validate(&too_many).await.is_err());

        let mut garbage = shares_of(&committee, 1, &[4]);
        garbage.shares[0].share = vec![0xff; 48];
        assert!(handler.validate(&garbage).await.is_err());

        let mut huge = shares_of(&committee, 1, &[4]);
        huge.eon = u64::MAX;
        assert!(matches!(
            handler.validate(&huge).await,
            Err(ValidationError::IntegerOverflow { field: "eon", .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_shares_without_successful_dkg() {
        let committee = Committee::new(3, 2);
        let shares = shares_of(&committee, 1, &[4]);

        let unknown = committee.node_without_eon(0);
        assert!(matches!(
            handler(&unknown).validate(&shares).await,
            Err(ValidationError::Invalid(_))
        ));

        let failed = committee.node_without_eon(0);
        failed
            .store
            .insert_eon(committee.eon(), DkgResult::Failure { eon: EON })
            .unwrap();
        assert!(matches!(
            handler(&failed).validate(&shares).await,
            Err(ValidationError::Invalid(_))
        ));
        assert!(failed.store.key_shares(EON, &EpochId::from_u64(4)).is_empty());
    }
}
