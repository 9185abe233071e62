//! Decryption triggers from the collator.
//!
//! A valid trigger makes the keyper publish its share for the triggered
//! epoch. If shares of peers arrived before the trigger, the key may
//! already be reconstructable and is published alongside.

use std::sync::Arc;

use async_trait::async_trait;
use rs_01_p2p_schema::{DecryptionTrigger, Message, P2PMessage};
use rs_02_p2p_messaging::{
    check_i64, check_instance_id, HandlerError, MessageHandler, MessageValidator,
    ValidationError, ValidationResult,
};
use tracing::info;

use crate::service::{EpochKeyGenerator, KeyperDependencies};

pub struct TriggerHandler {
    deps: KeyperDependencies,
    generator: Arc<EpochKeyGenerator>,
}

impl TriggerHandler {
    pub fn new(deps: KeyperDependencies, generator: Arc<EpochKeyGenerator>) -> Self {
        Self { deps, generator }
    }
}

#[async_trait]
impl MessageValidator<DecryptionTrigger> for TriggerHandler {
    async fn validate(
        &self,
        message: &DecryptionTrigger,
    ) -> Result<ValidationResult, ValidationError> {
        check_instance_id(self.deps.settings.instance_id, message.instance_id)?;
        check_i64("block_number", message.block_number)?;

        let collator = self
            .deps
            .chain
            .collator_for_block(message.block_number)
            .ok_or_else(|| {
                ValidationError::invalid(format!(
                    "no collator configured for block {}",
                    message.block_number
                ))
            })?;
        let signer = message
            .recover_signer()
            .map_err(|e| ValidationError::invalid(format!("invalid signature: {e}")))?;
        if signer != collator {
            return Err(ValidationError::invalid(format!(
                "trigger signed by 0x{} instead of collator 0x{}",
                hex::encode(signer),
                hex::encode(collator)
            )));
        }
        Ok(ValidationResult::Accept)
    }
}

#[async_trait]
impl MessageHandler<DecryptionTrigger> for TriggerHandler {
    async fn handle(&self, message: &DecryptionTrigger) -> Result<Vec<P2PMessage>, HandlerError> {
        let Some(shares) = self
            .generator
            .compute_key_shares(message.block_number, &[message.epoch_id])?
        else {
            return Ok(Vec::new());
        };
        info!(
            eon = shares.eon,
            epoch = %message.epoch_id,
            block_number = message.block_number,
            "sending decryption key share"
        );
        let eon = shares.eon;
        let mut out = vec![shares.into_p2p()];
        out.extend(
            self.generator
                .aggregate(eon, [message.epoch_id])?
                .into_iter()
                .map(Message::into_p2p),
        );
        Ok(out)
    }
}
