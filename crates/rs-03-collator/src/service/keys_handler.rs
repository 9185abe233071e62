//! Receives epoch secret keys published by the keypers.

use std::sync::Arc;

use async_trait::async_trait;
use rs_01_p2p_schema::{DecryptionKeys, P2PMessage};
use rs_02_p2p_messaging::{
    check_i64, check_instance_id, HandlerError, MessageHandler, MessageValidator,
    ValidationError, ValidationResult,
};
use tracing::debug;

use crate::domain::CollatorError;
use crate::service::{BatchHandler, CollatorDependencies};

/// Validates [`DecryptionKeys`] against the confirmed eon public key and
/// hands every key to the batch of its epoch.
pub struct KeysHandler {
    batches: Arc<BatchHandler>,
    deps: CollatorDependencies,
}

impl KeysHandler {
    pub fn new(batches: Arc<BatchHandler>, deps: CollatorDependencies) -> Self {
        Self { batches, deps }
    }
}

#[async_trait]
impl MessageValidator<DecryptionKeys> for KeysHandler {
    async fn validate(&self, message: &DecryptionKeys) -> Result<ValidationResult, ValidationError> {
        check_instance_id(self.deps.settings.instance_id, message.instance_id)?;
        check_i64("eon", message.eon)?;
        if message.keys.is_empty() {
            return Err(ValidationError::invalid("no keys in message"));
        }
        if !message
            .keys
            .windows(2)
            .all(|pair| pair[0].identity < pair[1].identity)
        {
            return Err(ValidationError::invalid(
                "keys not sorted by identity or duplicated",
            ));
        }

        // keys may arrive before the eon key votes do
        let Some(candidate) = self.deps.store.confirmed_eon_public_key(message.eon) else {
            debug!(eon = message.eon, "no confirmed eon public key, ignoring keys");
            return Ok(ValidationResult::Ignore);
        };
        let eon_public_key = shared_crypto::EonPublicKey::from_slice(&candidate.eon_public_key)
            .map_err(|e| ValidationError::Storage(format!("stored eon public key: {e}")))?;

        for key in &message.keys {
            let epoch_secret_key = key
                .epoch_secret_key()
                .map_err(|e| ValidationError::invalid(format!("malformed key: {e}")))?;
            if !epoch_secret_key.verify(key.identity.as_bytes(), &eon_public_key) {
                return Err(ValidationError::invalid(format!(
                    "epoch secret key for {} does not match eon {}",
                    key.identity, message.eon
                )));
            }
        }
        Ok(ValidationResult::Accept)
    }
}

#[async_trait]
impl MessageHandler<DecryptionKeys> for KeysHandler {
    async fn handle(&self, message: &DecryptionKeys) -> Result<Vec<P2PMessage>, HandlerError> {
        for key in &message.keys {
            match self
                .batches
                .handle_decryption_key(key.identity, key.key.clone())
                .await
            {
                Ok(()) => debug!(epoch = %key.identity, "forwarded decryption key"),
                Err(CollatorError::NoBatch(epoch)) => {
                    debug!(epoch = %epoch, "no batch for decryption key")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Vec::new())
    }
}
