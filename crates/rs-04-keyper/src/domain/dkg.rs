//! # DKG Result Model
//!
//! The keyper consumes the output of a finished DKG run; it never runs the
//! protocol itself. A successful run leaves every keyper with its share of
//! the eon secret, the eon public key and every keyper's public key share.
//!
//! | Operation                            | Group operation              |
//! |--------------------------------------|------------------------------|
//! | `compute_epoch_secret_key_share(id)` | `H(id) · s_i`                |
//! | `verify_epoch_secret_key_share`      | `e(share, g2) = e(H(id), g2·s_i)` |
//! | `verify_epoch_secret_key`            | `e(key, g2) = e(H(id), g2·s)`     |

use shared_crypto::{
    DealerOutput, EonPublicKey, EonPublicKeyShare, EonSecretKeyShare, EpochSecretKey,
    EpochSecretKeyShare,
};
use shared_types::IdentityPreimage;

use crate::domain::errors::KeyperError;

/// Window of batches governed by one DKG result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Eon {
    pub eon: u64,
    pub activation_block: u64,
    pub keyper_config_index: u64,
}

/// Output of a successful DKG run, seen from one keyper.
#[derive(Debug, Clone)]
pub struct PureDkgResult {
    pub eon: u64,
    pub num_keypers: u64,
    pub threshold: u64,
    /// This keyper's index.
    pub keyper_index: u64,
    pub secret_key_share: EonSecretKeyShare,
    pub public_key: EonPublicKey,
    /// Indexed by keyper index.
    pub public_key_shares: Vec<EonPublicKeyShare>,
}

impl PureDkgResult {
    /// Check that the parts fit together: threshold in range, one public
    /// key share per keyper, and the own secret share matching its public
    /// share.
    pub fn new(
        eon: u64,
        keyper_index: u64,
        threshold: u64,
        secret_key_share: EonSecretKeyShare,
        public_key: EonPublicKey,
        public_key_shares: Vec<EonPublicKeyShare>,
    ) -> Result<Self, KeyperError> {
        let num_keypers = public_key_shares.len() as u64;
        if threshold == 0 || threshold > num_keypers {
            return Err(KeyperError::InvalidDkgResult(format!(
                "threshold {threshold} out of range for {num_keypers} keypers"
            )));
        }
        let own_public_share = public_key_shares
            .get(keyper_index as usize)
            .ok_or(KeyperError::KeyperIndexOutOfRange {
                index: keyper_index,
                num_keypers,
            })?;
        if secret_key_share.public_key_share()? != *own_public_share {
            return Err(KeyperError::InvalidDkgResult(format!(
                "secret key share does not match public key share {keyper_index}"
            )));
        }
        Ok(Self {
            eon,
            num_keypers,
            threshold,
            keyper_index,
            secret_key_share,
            public_key,
            public_key_shares,
        })
    }

    /// Result of keyper `keyper_index` for a dealer-generated eon.
    pub fn from_dealer(
        eon: u64,
        keyper_index: u64,
        dealer: &DealerOutput,
    ) -> Result<Self, KeyperError> {
        let secret_key_share = dealer
            .secret_key_shares
            .get(keyper_index as usize)
            .cloned()
            .ok_or(KeyperError::KeyperIndexOutOfRange {
                index: keyper_index,
                num_keypers: dealer.num_keypers,
            })?;
        Self::new(
            eon,
            keyper_index,
            dealer.threshold,
            secret_key_share,
            dealer.eon_public_key,
            dealer.public_key_shares.clone(),
        )
    }

    pub fn compute_epoch_secret_key_share(
        &self,
        identity: &IdentityPreimage,
    ) -> Result<EpochSecretKeyShare, KeyperError> {
        Ok(self
            .secret_key_share
            .compute_epoch_secret_key_share(identity.as_bytes())?)
    }

    /// False for unknown keyper indices.
    pub fn verify_epoch_secret_key_share(
        &self,
        keyper_index: u64,
        identity: &IdentityPreimage,
        share: &EpochSecretKeyShare,
    ) -> bool {
        self.public_key_shares
            .get(keyper_index as usize)
            .is_some_and(|public_share| share.verify(identity.as_bytes(), public_share))
    }

    pub fn verify_epoch_secret_key(&self, identity: &IdentityPreimage, key: &EpochSecretKey) -> bool {
        key.verify(identity.as_bytes(), &self.public_key)
    }
}

/// Outcome of the DKG for one eon.
#[derive(Debug, Clone)]
pub enum DkgResult {
    Success(PureDkgResult),
    /// The eon exists but this keyper holds no usable share.
    Failure { eon: u64 },
}

impl DkgResult {
    pub fn eon(&self) -> u64 {
        match self {
            DkgResult::Success(result) => result.eon,
            DkgResult::Failure { eon } => *eon,
        }
    }

    pub fn success(&self) -> Option<&PureDkgResult> {
        match self {
            DkgResult::Success(result) => Some(result),
            DkgResult::Failure { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::ThresholdKeyGen;
    use shared_types::EpochId;

    fn dealer() -> DealerOutput {
        ThresholdKeyGen::new(3, 2, 1).unwrap().generate().unwrap()
    }

    #[test]
    fn test_share_verifies_only_for_its_sender() {
        let dealer = dealer();
        let result = PureDkgResult::from_dealer(0, 1, &dealer).unwrap();
        let identity = EpochId::from_u64(7);
        let share = result.compute_epoch_secret_key_share(&identity).unwrap();

        assert!(result.verify_epoch_secret_key_share(1, &identity, &share));
        assert!(!result.verify_epoch_secret_key_share(0, &identity, &share));
        assert!(!result.verify_epoch_secret_key_share(3, &identity, &share));
        assert!(!result.verify_epoch_secret_key_share(1, &EpochId::from_u64(8), &share));
    }

    #[test]
    fn test_rejects_inconsistent_parts() {
        let dealer = dealer();
        assert!(matches!(
            PureDkgResult::from_dealer(0, 3, &dealer),
            Err(KeyperError::KeyperIndexOutOfRange { index: 3, .. })
        ));

        // secret share of keyper 0 claimed by keyper 1
        let mismatched = PureDkgResult::new(
            0,
            1,
            2,
            dealer.secret_key_shares[0].clone(),
            dealer.eon_public_key,
            dealer.public_key_shares.clone(),
        );
        assert!(matches!(mismatched, Err(KeyperError::InvalidDkgResult(_))));

        let threshold_too_high = PureDkgResult::new(
            0,
            0,
            4,
            dealer.secret_key_shares[0].clone(),
            dealer.eon_public_key,
            dealer.public_key_shares.clone(),
        );
        assert!(threshold_too_high.is_err());
    }

    #[test]
    fn test_dkg_result_accessors() {
        let result = DkgResult::Success(PureDkgResult::from_dealer(4, 0, &dealer()).unwrap());
        assert_eq!(result.eon(), 4);
        assert!(result.success().is_some());

        let failed = DkgResult::Failure { eon: 5 };
        assert_eq!(failed.eon(), 5);
        assert!(failed.success().is_none());
    }
}
