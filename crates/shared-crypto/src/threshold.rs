//! # Threshold BLS (BLS12-381)
//!
//! Epoch keys live in G1 (48 bytes compressed), eon public keys and public
//! key shares in G2 (96 bytes compressed). This is blst's `min_sig` layout:
//! an epoch secret key share is the `min_sig` signature of the identity
//! preimage under the keyper's eon secret key share, so verification is a
//! single pairing check.
//!
//! Aggregation interpolates at `x = 0` with keyper `i` at `x = i + 1`.

use blst::min_sig::{PublicKey, SecretKey, Signature};
use blst::{
    blst_bendian_from_scalar, blst_fr, blst_fr_from_uint64, blst_fr_inverse, blst_fr_mul,
    blst_fr_sub, blst_lendian_from_scalar, blst_p1, blst_p1_add_or_double, blst_p1_affine,
    blst_p1_affine_in_g1, blst_p1_compress, blst_p1_from_affine, blst_p1_is_inf, blst_p1_mult,
    blst_p1_uncompress, blst_scalar, blst_scalar_from_fr, BLST_ERROR,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::CryptoError;

/// Hash-to-G1 domain separation tag for identity preimages.
pub const IDENTITY_DST: &[u8] = b"SHUTTER_V01_BLS12381G1_XMD:SHA-256_SSWU_RO_";

const G1_LEN: usize = 48;
const G2_LEN: usize = 96;
const SCALAR_BITS: usize = 255;

macro_rules! point_type {
    ($(#[$meta:meta])* $name:ident, $len:expr, $label:expr, $check:expr) => {
        $(#[$meta])*
        #[serde_as]
        #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name(#[serde_as(as = "Bytes")] [u8; $len]);

        impl $name {
            /// Encoded length in bytes.
            pub const LEN: usize = $len;

            /// Parse and validate a compressed encoding.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
                if bytes.len() != $len {
                    return Err(CryptoError::InvalidKeyLength {
                        expected: $len,
                        actual: bytes.len(),
                    });
                }
                if !$check(bytes) {
                    return Err(CryptoError::InvalidPoint($label));
                }
                let mut out = [0u8; $len];
                out.copy_from_slice(bytes);
                Ok(Self(out))
            }

            /// Compressed encoding.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Owned copy of the compressed encoding.
            pub fn to_vec(&self) -> Vec<u8> {
                self.0.to_vec()
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}(0x", stringify!($name))?;
                for b in &self.0[..6] {
                    write!(f, "{b:02x}")?;
                }
                write!(f, "..)")
            }
        }
    };
}

point_type!(
    /// Eon public key `g2 · s`.
    EonPublicKey, G2_LEN, "G2", is_valid_g2
);
point_type!(
    /// Public key share of keyper `i`: `g2 · s_i`.
    EonPublicKeyShare, G2_LEN, "G2", is_valid_g2
);
point_type!(
    /// Epoch secret key share `H(id) · s_i`.
    EpochSecretKeyShare, G1_LEN, "G1", is_valid_g1
);
point_type!(
    /// Epoch secret key `H(id) · s`.
    EpochSecretKey, G1_LEN, "G1", is_valid_g1
);

fn is_valid_g1(bytes: &[u8]) -> bool {
    decode_g1(bytes).is_some()
}

fn is_valid_g2(bytes: &[u8]) -> bool {
    PublicKey::key_validate(bytes).is_ok()
}

/// Keyper's share of the eon secret key (big-endian scalar).
#[derive(Clone, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
pub struct EonSecretKeyShare([u8; 32]);

impl EonSecretKeyShare {
    /// Wrap a big-endian scalar; fails for zero or values ≥ the group order.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        SecretKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self(bytes))
    }

    /// Raw big-endian scalar.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn secret_key(&self) -> Result<SecretKey, CryptoError> {
        SecretKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPrivateKey)
    }

    /// `g2 · s_i`.
    pub fn public_key_share(&self) -> Result<EonPublicKeyShare, CryptoError> {
        Ok(EonPublicKeyShare(self.secret_key()?.sk_to_pk().to_bytes()))
    }

    /// `H(identity) · s_i`.
    pub fn compute_epoch_secret_key_share(
        &self,
        identity: &[u8],
    ) -> Result<EpochSecretKeyShare, CryptoError> {
        let sig = self.secret_key()?.sign(identity, IDENTITY_DST, &[]);
        Ok(EpochSecretKeyShare(sig.to_bytes()))
    }

    pub(crate) fn eon_public_key(&self) -> Result<EonPublicKey, CryptoError> {
        Ok(EonPublicKey(self.secret_key()?.sk_to_pk().to_bytes()))
    }
}

impl std::fmt::Debug for EonSecretKeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EonSecretKeyShare(..)")
    }
}

impl EpochSecretKeyShare {
    /// Pairing check against the sender's public key share.
    pub fn verify(&self, identity: &[u8], public_key_share: &EonPublicKeyShare) -> bool {
        verify_against(&self.0, &public_key_share.0, identity)
    }
}

impl EpochSecretKey {
    /// Pairing check against the eon public key.
    pub fn verify(&self, identity: &[u8], eon_public_key: &EonPublicKey) -> bool {
        verify_against(&self.0, &eon_public_key.0, identity)
    }
}

fn verify_against(g1: &[u8], g2: &[u8], identity: &[u8]) -> bool {
    let Ok(sig) = Signature::from_bytes(g1) else {
        return false;
    };
    let Ok(pk) = PublicKey::from_bytes(g2) else {
        return false;
    };
    sig.verify(true, identity, IDENTITY_DST, &[], &pk, true) == BLST_ERROR::BLST_SUCCESS
}

/// Reconstruct the epoch secret key from exactly `threshold` shares.
///
/// `keyper_indices[k]` is the sender of `shares[k]`. Indices must be
/// distinct. Shares are not verified here; callers verify them on ingress.
pub fn compute_epoch_secret_key(
    keyper_indices: &[u64],
    shares: &[EpochSecretKeyShare],
    threshold: u64,
) -> Result<EpochSecretKey, CryptoError> {
    if keyper_indices.len() != shares.len() {
        return Err(CryptoError::AggregationFailed(format!(
            "{} indices for {} shares",
            keyper_indices.len(),
            shares.len()
        )));
    }
    if threshold == 0 || shares.len() as u64 != threshold {
        return Err(CryptoError::AggregationFailed(format!(
            "need exactly {threshold} shares, got {}",
            shares.len()
        )));
    }
    let mut seen = std::collections::HashSet::new();
    if !keyper_indices.iter().all(|i| seen.insert(*i)) {
        return Err(CryptoError::AggregationFailed(
            "duplicate keyper index".to_string(),
        ));
    }

    let coefficients = lagrange_coefficients(keyper_indices)?;

    let mut acc: Option<blst_p1> = None;
    for (share, lambda) in shares.iter().zip(coefficients.iter()) {
        let point = decode_g1(&share.0).ok_or(CryptoError::InvalidPoint("G1"))?;
        let term = mul_g1(&point, lambda);
        acc = Some(match acc {
            None => term,
            Some(sum) => add_g1(&sum, &term),
        });
    }
    let sum = acc.ok_or_else(|| CryptoError::AggregationFailed("no shares".to_string()))?;

    // SAFETY: `sum` is a valid, initialized projective point.
    if unsafe { blst_p1_is_inf(&sum) } {
        return Err(CryptoError::AggregationFailed(
            "reconstructed point at infinity".to_string(),
        ));
    }
    let mut out = [0u8; G1_LEN];
    // SAFETY: `out` has room for a 48-byte compressed G1 point.
    unsafe { blst_p1_compress(out.as_mut_ptr(), &sum) };
    Ok(EpochSecretKey(out))
}

// ============================================================================
// Fr / G1 ARITHMETIC
// ============================================================================

pub(crate) fn fr_from_u64(n: u64) -> blst_fr {
    fr_from_limbs([n, 0, 0, 0])
}

pub(crate) fn fr_from_limbs(limbs: [u64; 4]) -> blst_fr {
    let mut out = blst_fr::default();
    // SAFETY: `limbs` points to four little-endian u64 limbs.
    unsafe { blst_fr_from_uint64(&mut out, limbs.as_ptr()) };
    out
}

pub(crate) fn fr_mul(a: &blst_fr, b: &blst_fr) -> blst_fr {
    let mut out = blst_fr::default();
    // SAFETY: all pointers reference initialized field elements.
    unsafe { blst_fr_mul(&mut out, a, b) };
    out
}

pub(crate) fn fr_add(a: &blst_fr, b: &blst_fr) -> blst_fr {
    let mut out = blst_fr::default();
    // SAFETY: all pointers reference initialized field elements.
    unsafe { blst::blst_fr_add(&mut out, a, b) };
    out
}

fn fr_sub(a: &blst_fr, b: &blst_fr) -> blst_fr {
    let mut out = blst_fr::default();
    // SAFETY: all pointers reference initialized field elements.
    unsafe { blst_fr_sub(&mut out, a, b) };
    out
}

fn fr_inverse(a: &blst_fr) -> blst_fr {
    let mut out = blst_fr::default();
    // SAFETY: all pointers reference initialized field elements.
    unsafe { blst_fr_inverse(&mut out, a) };
    out
}

fn fr_is_zero(a: &blst_fr) -> bool {
    *a == blst_fr::default()
}

fn fr_to_scalar(a: &blst_fr) -> blst_scalar {
    let mut out = blst_scalar::default();
    // SAFETY: all pointers reference initialized values.
    unsafe { blst_scalar_from_fr(&mut out, a) };
    out
}

/// Big-endian encoding of a field element.
pub(crate) fn fr_to_bendian(a: &blst_fr) -> [u8; 32] {
    let scalar = fr_to_scalar(a);
    let mut out = [0u8; 32];
    // SAFETY: `out` has room for 32 bytes.
    unsafe { blst_bendian_from_scalar(out.as_mut_ptr(), &scalar) };
    out
}

fn fr_to_lendian(a: &blst_fr) -> [u8; 32] {
    let scalar = fr_to_scalar(a);
    let mut out = [0u8; 32];
    // SAFETY: `out` has room for 32 bytes.
    unsafe { blst_lendian_from_scalar(out.as_mut_ptr(), &scalar) };
    out
}

/// λ_i = Π_{j ≠ i} x_j / (x_j − x_i) with x = index + 1.
fn lagrange_coefficients(indices: &[u64]) -> Result<Vec<blst_fr>, CryptoError> {
    let xs: Vec<blst_fr> = indices
        .iter()
        .map(|i| {
            i.checked_add(1)
                .map(fr_from_u64)
                .ok_or_else(|| CryptoError::InvalidInput(format!("keyper index {i} too large")))
        })
        .collect::<Result<_, _>>()?;

    let mut out = Vec::with_capacity(xs.len());
    for (i, xi) in xs.iter().enumerate() {
        let mut num = fr_from_u64(1);
        let mut den = fr_from_u64(1);
        for (j, xj) in xs.iter().enumerate() {
            if i == j {
                continue;
            }
            num = fr_mul(&num, xj);
            den = fr_mul(&den, &fr_sub(xj, xi));
        }
        if fr_is_zero(&den) {
            return Err(CryptoError::AggregationFailed(
                "duplicate evaluation point".to_string(),
            ));
        }
        out.push(fr_mul(&num, &fr_inverse(&den)));
    }
    Ok(out)
}

fn decode_g1(bytes: &[u8]) -> Option<blst_p1> {
    if bytes.len() != G1_LEN {
        return None;
    }
    let mut affine = blst_p1_affine::default();
    // SAFETY: `bytes` holds exactly 48 bytes.
    let res = unsafe { blst_p1_uncompress(&mut affine, bytes.as_ptr()) };
    if res != BLST_ERROR::BLST_SUCCESS {
        return None;
    }
    // SAFETY: `affine` was initialized by a successful uncompress.
    if !unsafe { blst_p1_affine_in_g1(&affine) } {
        return None;
    }
    let mut point = blst_p1::default();
    // SAFETY: both pointers reference initialized points.
    unsafe { blst_p1_from_affine(&mut point, &affine) };
    Some(point)
}

fn mul_g1(point: &blst_p1, scalar: &blst_fr) -> blst_p1 {
    let le = fr_to_lendian(scalar);
    let mut out = blst_p1::default();
    // SAFETY: `le` is a 32-byte little-endian scalar below the group order.
    unsafe { blst_p1_mult(&mut out, point, le.as_ptr(), SCALAR_BITS) };
    out
}

fn add_g1(a: &blst_p1, b: &blst_p1) -> blst_p1 {
    let mut out = blst_p1::default();
    // SAFETY: all pointers reference initialized points.
    unsafe { blst_p1_add_or_double(&mut out, a, b) };
    out
}
