//! # Deterministic Threshold Key Generation
//!
//! A trusted-dealer Shamir split of a random eon secret. Used by tests and
//! the devnet binary in place of a real DKG run; a fixed seed yields the same
//! eon on every node.

use rand::{rngs::StdRng, RngCore, SeedableRng};

use crate::threshold::{fr_add, fr_from_limbs, fr_from_u64, fr_mul, fr_to_bendian};
use crate::{CryptoError, EonPublicKey, EonPublicKeyShare, EonSecretKeyShare, EpochSecretKey};

/// Seeded dealer for `threshold`-of-`num_keypers` eon keys.
pub struct ThresholdKeyGen {
    num_keypers: u64,
    threshold: u64,
    rng: StdRng,
}

/// Everything a dealer hands out for one eon.
#[derive(Debug, Clone)]
pub struct DealerOutput {
    /// Number of keypers.
    pub num_keypers: u64,
    /// Shares needed to reconstruct.
    pub threshold: u64,
    /// `g2 · s`.
    pub eon_public_key: EonPublicKey,
    /// `s_i`, indexed by keyper index.
    pub secret_key_shares: Vec<EonSecretKeyShare>,
    /// `g2 · s_i`, indexed by keyper index.
    pub public_key_shares: Vec<EonPublicKeyShare>,
    eon_secret_key: EonSecretKeyShare,
}

impl ThresholdKeyGen {
    /// Requires `1 <= threshold <= num_keypers`.
    pub fn new(num_keypers: u64, threshold: u64, seed: u64) -> Result<Self, CryptoError> {
        if threshold == 0 || threshold > num_keypers {
            return Err(CryptoError::InvalidInput(format!(
                "threshold {threshold} out of range for {num_keypers} keypers"
            )));
        }
        Ok(Self {
            num_keypers,
            threshold,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Sample a fresh polynomial and evaluate it for every keyper.
    pub fn generate(&mut self) -> Result<DealerOutput, CryptoError> {
        let coefficients: Vec<_> = (0..self.threshold).map(|_| self.random_fr()).collect();

        let eon_secret_key = EonSecretKeyShare::from_bytes(fr_to_bendian(&coefficients[0]))?;
        let eon_public_key = eon_secret_key.eon_public_key()?;

        let mut secret_key_shares = Vec::with_capacity(self.num_keypers as usize);
        let mut public_key_shares = Vec::with_capacity(self.num_keypers as usize);
        for index in 0..self.num_keypers {
            let x = fr_from_u64(index + 1);
            // Horner
            let mut acc = fr_from_u64(0);
            for c in coefficients.iter().rev() {
                acc = fr_add(&fr_mul(&acc, &x), c);
            }
            let share = EonSecretKeyShare::from_bytes(fr_to_bendian(&acc))?;
            public_key_shares.push(share.public_key_share()?);
            secret_key_shares.push(share);
        }

        Ok(DealerOutput {
            num_keypers: self.num_keypers,
            threshold: self.threshold,
            eon_public_key,
            secret_key_shares,
            public_key_shares,
            eon_secret_key,
        })
    }

    fn random_fr(&mut self) -> blst::blst_fr {
        loop {
            let mut limbs = [0u64; 4];
            for limb in limbs.iter_mut() {
                *limb = self.rng.next_u64();
            }
            // Stay below the group order.
            limbs[3] &= (1 << 60) - 1;
            let fr = fr_from_limbs(limbs);
            if fr != fr_from_u64(0) {
                return fr;
            }
        }
    }
}

impl DealerOutput {
    /// Epoch secret key computed directly from the eon secret.
    pub fn epoch_secret_key(&self, identity: &[u8]) -> Result<EpochSecretKey, CryptoError> {
        let share = self
            .eon_secret_key
            .compute_epoch_secret_key_share(identity)?;
        EpochSecretKey::from_slice(share.as_bytes())
    }
}
