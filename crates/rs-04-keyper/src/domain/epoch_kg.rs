//! Epoch secret key aggregation.
//!
//! Shares are interpolated at `x = 0`. Any `threshold` valid shares yield
//! the same key, so the order in which shares arrive does not matter.

use std::collections::BTreeMap;

use shared_crypto::{compute_epoch_secret_key, EpochSecretKey, EpochSecretKeyShare};
use shared_types::IdentityPreimage;
use tracing::warn;

use crate::domain::dkg::PureDkgResult;
use crate::domain::errors::KeyperError;

/// One keyper's share for one identity, as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionKeyShare {
    pub eon: u64,
    pub identity: IdentityPreimage,
    pub keyper_index: u64,
    pub share: Vec<u8>,
}

/// Reconstruct the epoch secret key of `identity` from stored shares.
///
/// Malformed or unverifiable shares are logged and skipped. Returns `None`
/// while fewer than `threshold` valid shares are known.
pub fn aggregate_epoch_secret_key(
    dkg: &PureDkgResult,
    identity: &IdentityPreimage,
    shares: &[DecryptionKeyShare],
) -> Result<Option<EpochSecretKey>, KeyperError> {
    let mut valid: BTreeMap<u64, EpochSecretKeyShare> = BTreeMap::new();
    for stored in shares {
        if stored.eon != dkg.eon || stored.identity != *identity {
            continue;
        }
        let share = match EpochSecretKeyShare::from_slice(&stored.share) {
            Ok(share) => share,
            Err(e) => {
                warn!(
                    epoch = %identity,
                    keyper_index = stored.keyper_index,
                    error = %e,
                    "invalid decryption key share in store"
                );
                continue;
            }
        };
        if !dkg.verify_epoch_secret_key_share(stored.keyper_index, identity, &share) {
            warn!(
                epoch = %identity,
                keyper_index = stored.keyper_index,
                "failed to verify decryption key share"
            );
            continue;
        }
        valid.insert(stored.keyper_index, share);
    }

    if (valid.len() as u64) < dkg.threshold {
        return Ok(None);
    }

    let (indices, chosen): (Vec<u64>, Vec<EpochSecretKeyShare>) =
        valid.into_iter().take(dkg.threshold as usize).unzip();
    let key = compute_epoch_secret_key(&indices, &chosen, dkg.threshold).map_err(|e| {
        KeyperError::Reconstruction {
            identity: *identity,
            shares: chosen.len(),
            reason: e.to_string(),
        }
    })?;
    if !dkg.verify_epoch_secret_key(identity, &key) {
        return Err(KeyperError::Reconstruction {
            identity: *identity,
            shares: chosen.len(),
            reason: "key does not match eon public key".to_string(),
        });
    }
    Ok(Some(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shared_crypto::{DealerOutput, ThresholdKeyGen};
    use shared_types::EpochId;

    const EON: u64 = 3;

    fn stored(dealer: &DealerOutput, keyper_index: u64, identity: &IdentityPreimage) -> DecryptionKeyShare {
        let share = dealer.secret_key_shares[keyper_index as usize]
            .compute_epoch_secret_key_share(identity.as_bytes())
            .unwrap();
        DecryptionKeyShare {
            eon: EON,
            identity: *identity,
            keyper_index,
            share: share.to_vec(),
        }
    }

    #[test]
    fn test_below_threshold_yields_nothing() {
        let dealer = ThresholdKeyGen::new(3, 2, 5).unwrap().generate().unwrap();
        let dkg = PureDkgResult::from_dealer(EON, 0, &dealer).unwrap();
        let identity = EpochId::from_u64(1);

        let shares = vec![stored(&dealer, 0, &identity)];
        assert!(aggregate_epoch_secret_key(&dkg, &identity, &shares)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_skips_malformed_and_foreign_shares() {
        let dealer = ThresholdKeyGen::new(3, 2, 5).unwrap().generate().unwrap();
        let dkg = PureDkgResult::from_dealer(EON, 0, &dealer).unwrap();
        let identity = EpochId::from_u64(1);

        let mut garbage = stored(&dealer, 1, &identity);
        garbage.share = vec![0xff; 48];
        // share of keyper 2 attributed to keyper 1
        let mut misattributed = stored(&dealer, 2, &identity);
        misattributed.keyper_index = 1;
        let other_epoch = stored(&dealer, 2, &EpochId::from_u64(2));

        let shares = vec![stored(&dealer, 0, &identity), garbage, misattributed, other_epoch];
        assert!(aggregate_epoch_secret_key(&dkg, &identity, &shares)
            .unwrap()
            .is_none());

        let mut complete = shares;
        complete.push(stored(&dealer, 2, &identity));
        let key = aggregate_epoch_secret_key(&dkg, &identity, &complete)
            .unwrap()
            .unwrap();
        assert_eq!(key, dealer.epoch_secret_key(identity.as_bytes()).unwrap());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_any_threshold_subset_reconstructs(
            seed in any::<u64>(),
            epoch in any::<u64>(),
            subset in proptest::sample::subsequence(vec![0u64, 1, 2, 3, 4], 3),
        ) {
            let dealer = ThresholdKeyGen::new(5, 3, seed).unwrap().generate().unwrap();
            let dkg = PureDkgResult::from_dealer(EON, 0, &dealer).unwrap();
            let identity = EpochId::from_u64(epoch);
            let shares: Vec<_> = subset.iter().map(|i| stored(&dealer, *i, &identity)).collect();

            let key = aggregate_epoch_secret_key(&dkg, &identity, &shares).unwrap().unwrap();
            prop_assert_eq!(key, dealer.epoch_secret_key(identity.as_bytes()).unwrap());
            prop_assert!(dkg.verify_epoch_secret_key(&identity, &key));
        }
    }
}
