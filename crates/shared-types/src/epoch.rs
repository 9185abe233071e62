//! # Epoch Id / Identity Preimage
//!
//! A 32-byte big-endian tag naming a batch. The same bytes are the identity
//! preimage fed into the threshold hash, so every conversion must be exact.
//!
//! Ordering is byte-lexicographic which, because the encoding is big-endian
//! and fixed-width, equals numeric ordering.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::TypesError;
use crate::primitives::U256;

/// Identity preimage and epoch id share one representation.
pub type IdentityPreimage = EpochId;

/// 32-byte epoch id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct EpochId([u8; 32]);

impl EpochId {
    /// Length of the encoding in bytes.
    pub const LEN: usize = 32;

    /// Wrap raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build from a byte slice; fails unless it is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypesError> {
        if bytes.len() != Self::LEN {
            return Err(TypesError::InvalidLength {
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Encode a batch index.
    pub fn from_u64(n: u64) -> Self {
        let mut out = [0u8; 32];
        out[24..].copy_from_slice(&n.to_be_bytes());
        Self(out)
    }

    /// Encode a 256-bit integer.
    pub fn from_u256(n: U256) -> Self {
        let mut out = [0u8; 32];
        n.to_big_endian(&mut out);
        Self(out)
    }

    /// Parse from hex, with or without `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Owned copy of the raw bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Numeric value.
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Batch index; fails if any of the upper 24 bytes is set.
    pub fn to_u64(&self) -> Result<u64, TypesError> {
        if self.0[..24].iter().any(|b| *b != 0) {
            return Err(TypesError::Overflow(self.to_hex(), "u64"));
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[24..]);
        Ok(u64::from_be_bytes(buf))
    }

    /// The epoch id following this one.
    pub fn next(&self) -> Result<Self, TypesError> {
        let (n, overflow) = self.to_u256().overflowing_add(U256::one());
        if overflow {
            return Err(TypesError::Overflow(self.to_hex(), "U256"));
        }
        Ok(Self::from_u256(n))
    }

    /// Full `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for EpochId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for EpochId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// Short form for log lines, e.g. `0000..0001`.
impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = hex::encode(self.0);
        write!(f, "{}..{}", &h[..4], &h[h.len() - 4..])
    }
}

impl fmt::Debug for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EpochId({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_from_u64_layout() {
        let id = EpochId::from_u64(1);
        assert_eq!(id.as_bytes()[31], 1);
        assert!(id.as_bytes()[..31].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(EpochId::from_slice(&[0u8; 31]).is_err());
        assert!(EpochId::from_slice(&[0u8; 33]).is_err());
    }

    #[test]
    fn test_to_u64_overflow() {
        let mut bytes = [0u8; 32];
        bytes[0] = 1;
        assert!(EpochId::new(bytes).to_u64().is_err());
    }

    #[test]
    fn test_next_overflow() {
        assert!(EpochId::new([0xFF; 32]).next().is_err());
        assert_eq!(EpochId::from_u64(7).next().unwrap(), EpochId::from_u64(8));
    }

    #[test]
    fn test_display_short_form() {
        assert_eq!(EpochId::from_u64(1).to_string(), "0000..0001");
    }

    #[test]
    fn test_serde_json() {
        let id = EpochId::from_u64(42);
        let json = serde_json::to_string(&id).unwrap();
        let back: EpochId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    proptest! {
        #[test]
        fn prop_u64_roundtrip(n in any::<u64>()) {
            let id = EpochId::from_u64(n);
            prop_assert_eq!(id.to_u64().unwrap(), n);
            prop_assert_eq!(EpochId::from_u256(id.to_u256()), id);
        }

        #[test]
        fn prop_order_matches_numeric(a in any::<u64>(), b in any::<u64>()) {
            prop_assert_eq!(EpochId::from_u64(a).cmp(&EpochId::from_u64(b)), a.cmp(&b));
        }
    }
}
