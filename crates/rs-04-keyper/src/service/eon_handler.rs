//! Eon public key announcements of peer keypers.
//!
//! Keypers of the same eon must have ended the DKG with the same public
//! key. A differing announcement is accepted for relaying but logged, since
//! it points at a broken DKG run on one side.

use async_trait::async_trait;
use rs_01_p2p_schema::{EonPublicKey, P2PMessage};
use rs_02_p2p_messaging::{
    check_i64, check_instance_id, HandlerError, MessageHandler, MessageValidator,
    ValidationError, ValidationResult,
};
use tracing::{debug, warn};

use crate::service::KeyperDependencies;

pub struct EonKeyHandler {
    deps: KeyperDependencies,
}

impl EonKeyHandler {
    pub fn new(deps: KeyperDependencies) -> Self {
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
        let own = self.deps.store.dkg_result(message.eon);
        match own.as_ref().and_then(|dkg| dkg.success()) {
            Some(dkg) if dkg.public_key.as_bytes()[..] != message.public_key[..] => {
                warn!(
                    eon = message.eon,
                    keyper_index = message.keyper_index,
                    "peer announced an eon public key that differs from our DKG result"
                );
            }
            _ => debug!(
                eon = message.eon,
                keyper_index = message.keyper_index,
                "eon public key announcement"
            ),
        }
        Ok(Vec::new())
    }
}
