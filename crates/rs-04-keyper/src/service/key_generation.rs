//! Epoch key share computation and aggregation.
//!
//! Both paths persist before they publish: a share or key is only sent by
//! the call that inserted it, so replays of a trigger or of peer shares do
//! not produce duplicate messages.

use std::collections::BTreeSet;

use rs_01_p2p_schema::{DecryptionKeyShares, DecryptionKeys, Key, KeyShare};
use shared_types::{EpochId, IdentityPreimage};
use shutter_telemetry::metrics::{KEYPER_KEYS_GENERATED, KEYPER_SHARES_SENT};
use tracing::{debug, info};

use crate::domain::{aggregate_epoch_secret_key, DecryptionKeyShare, KeyperError};
use crate::service::KeyperDependencies;

pub struct EpochKeyGenerator {
    deps: KeyperDependencies,
}

impl EpochKeyGenerator {
    pub fn new(deps: KeyperDependencies) -> Self {
        Self { deps }
    }

    /// Compute and persist this keyper's shares for `epoch_ids`, which must
    /// be sorted. Returns `None` if no eon is active at `block_number`, if
    /// this keyper is not part of the eon's keyper set, if its DKG failed,
    /// or if the shares were computed before.
    pub fn compute_key_shares(
        &self,
        block_number: u64,
        epoch_ids: &[EpochId],
    ) -> Result<Option<DecryptionKeyShares>, KeyperError> {
        let Some(first) = epoch_ids.first() else {
            return Ok(None);
        };
        let Some(eon) = self.deps.store.eon_for_block(block_number) else {
            info!(block_number, "no eon active, ignoring decryption trigger");
            return Ok(None);
        };
        let Some(keyper_set) = self.deps.chain.keyper_set(eon.keyper_config_index) else {
            info!(
                eon = eon.eon,
                keyper_config_index = eon.keyper_config_index,
                "keyper set of eon unknown, ignoring decryption trigger"
            );
            return Ok(None);
        };
        let Some(keyper_index) = keyper_set.keyper_index(&self.deps.key.address()) else {
            debug!(eon = eon.eon, "not a keyper of this eon");
            return Ok(None);
        };
        if self
            .deps
            .store
            .key_share_exists(eon.eon, first, keyper_index)
        {
            debug!(eon = eon.eon, epoch = %first, "key share already computed");
            return Ok(None);
        }

        let dkg = self
            .deps
            .store
            .dkg_result(eon.eon)
            .ok_or(KeyperError::NoDkgResult(eon.eon))?;
        let Some(dkg) = dkg.success() else {
            info!(eon = eon.eon, "DKG failed for eon, cannot compute key share");
            return Ok(None);
        };
        if dkg.keyper_index != keyper_index {
            return Err(KeyperError::InvalidDkgResult(format!(
                "DKG result of eon {} belongs to keyper {} but keyper set lists us as {keyper_index}",
                eon.eon, dkg.keyper_index
            )));
        }

        let mut stored = Vec::with_capacity(epoch_ids.len());
        let mut shares = Vec::with_capacity(epoch_ids.len());
        for epoch_id in epoch_ids {
            let share = dkg.compute_epoch_secret_key_share(epoch_id)?.to_vec();
            stored.push(DecryptionKeyShare {
                eon: eon.eon,
                identity: *epoch_id,
                keyper_index,
                share: share.clone(),
            });
            shares.push(KeyShare {
                epoch_id: *epoch_id,
                share,
            });
        }
        self.deps.store.insert_key_shares(&stored)?;
        KEYPER_SHARES_SENT.inc_by(shares.len() as f64);

        Ok(Some(DecryptionKeyShares {
            instance_id: self.deps.settings.instance_id,
            eon: eon.eon,
            keyper_index,
            shares,
        }))
    }

    /// Reconstruct the keys of `identities` that are still unknown and have
    /// enough stored shares. New keys are persisted and returned in
    /// ascending identity order, split into messages of at most
    /// `max_num_keys_per_message` keys.
    pub fn aggregate<I>(&self, eon: u64, identities: I) -> Result<Vec<DecryptionKeys>, KeyperError>
    where
        I: IntoIterator<Item = IdentityPreimage>,
    {
        let dkg = self
            .deps
            .store
            .dkg_result(eon)
            .ok_or(KeyperError::NoDkgResult(eon))?;
        let Some(dkg) = dkg.success() else {
            return Ok(Vec::new());
        };

        let identities: BTreeSet<IdentityPreimage> = identities.into_iter().collect();
        let mut keys = Vec::new();
        for identity in identities {
            if self.deps.store.decryption_key(eon, &identity).is_some() {
                continue;
            }
            let shares = self.deps.store.key_shares(eon, &identity);
            let Some(key) = aggregate_epoch_secret_key(dkg, &identity, &shares)? else {
                debug!(
                    eon,
                    epoch = %identity,
                    shares = shares.len(),
                    threshold = dkg.threshold,
                    "not enough key shares yet"
                );
                continue;
            };
            let key = key.to_vec();
            if self
                .deps
                .store
                .insert_decryption_key(eon, &identity, key.clone())?
            {
                info!(eon, epoch = %identity, "decryption key generated");
                keys.push(Key { identity, key });
            }
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        KEYPER_KEYS_GENERATED.inc_by(keys.len() as f64);

        let max = self.deps.settings.max_num_keys_per_message.max(1);
        Ok(keys
            .chunks(max)
            .map(|chunk| DecryptionKeys {
                instance_id: self.deps.settings.instance_id,
                eon,
                keys: chunk.to_vec(),
            })
            .collect())
    }
}
