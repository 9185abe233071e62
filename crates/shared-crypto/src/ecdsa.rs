//! # ECDSA Signatures (secp256k1, recoverable)
//!
//! Ethereum-style signatures over a 32-byte prehash.
//!
//! ## Wire Format
//!
//! 65 bytes `r || s || v`. Signing produces `v ∈ {0, 1}`; recovery accepts
//! `v ∈ {0, 1, 27, 28}`.
//!
//! ## Security Properties
//!
//! - RFC 6979 deterministic nonces (no RNG dependency for signing)
//! - Low-S normalization on signing, high-S rejected on recovery (EIP-2)

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use shared_types::{Address, Hash};
use zeroize::Zeroize;

use crate::hashing::keccak256;
use crate::CryptoError;

/// Recoverable ECDSA signature (65 bytes, `r || s || v`).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature([u8; 65]);

impl RecoverableSignature {
    /// Length of the encoding.
    pub const LEN: usize = 65;

    /// Parse from a 65-byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != Self::LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; 65];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Build from components.
    pub fn from_parts(r: &[u8; 32], s: &[u8; 32], v: u8) -> Self {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(r);
        out[32..64].copy_from_slice(s);
        out[64] = v;
        Self(out)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    /// Owned copy of the raw bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// `r` component.
    pub fn r(&self) -> [u8; 32] {
        let mut r = [0u8; 32];
        r.copy_from_slice(&self.0[..32]);
        r
    }

    /// `s` component.
    pub fn s(&self) -> [u8; 32] {
        let mut s = [0u8; 32];
        s.copy_from_slice(&self.0[32..64]);
        s
    }

    /// Recovery byte as stored.
    pub fn v(&self) -> u8 {
        self.0[64]
    }

    /// Recover the signer address of `prehash`.
    pub fn recover(&self, prehash: &Hash) -> Result<Address, CryptoError> {
        let recovery_id = parse_recovery_id(self.v())?;
        let sig = Signature::from_slice(&self.0[..64])
            .map_err(|_| CryptoError::InvalidSignatureFormat)?;
        if sig.normalize_s().is_some() {
            return Err(CryptoError::MalleableSignature);
        }
        let key = VerifyingKey::recover_from_prehash(prehash, &sig, recovery_id)
            .map_err(|_| CryptoError::RecoveryFailed)?;
        Ok(address_from_verifying_key(&key))
    }
}

impl std::fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecoverableSignature(0x")?;
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// secp256k1 ECDSA keypair.
pub struct Secp256k1KeyPair {
    signing_key: SigningKey,
}

impl Secp256k1KeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_bytes((&bytes).into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Ethereum address of this key.
    pub fn address(&self) -> Address {
        address_from_verifying_key(self.signing_key.verifying_key())
    }

    /// Sign a 32-byte prehash (deterministic RFC 6979, low-S).
    pub fn sign_prehash(&self, prehash: &Hash) -> Result<RecoverableSignature, CryptoError> {
        let (sig, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(prehash)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(RecoverableSignature::from_parts(&r, &s, recovery_id.to_byte()))
    }

    /// Get secret key bytes (for serialization).
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }
}

impl Clone for Secp256k1KeyPair {
    fn clone(&self) -> Self {
        Self {
            signing_key: self.signing_key.clone(),
        }
    }
}

impl std::fmt::Debug for Secp256k1KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secp256k1KeyPair")
            .field("address", &shared_types::format_address(&self.address()))
            .finish_non_exhaustive()
    }
}

impl Drop for Secp256k1KeyPair {
    fn drop(&mut self) {
        // Zeroize secret key material
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        bytes.zeroize();
    }
}

/// Recover the signer address of `prehash` from a 65-byte signature.
pub fn recover_address(prehash: &Hash, signature: &[u8]) -> Result<Address, CryptoError> {
    RecoverableSignature::from_slice(signature)?.recover(prehash)
}

/// Ethereum address: last 20 bytes of keccak256 of the uncompressed key
/// without its `0x04` prefix.
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

fn parse_recovery_id(v: u8) -> Result<RecoveryId, CryptoError> {
    let normalized = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => return Err(CryptoError::InvalidRecoveryId(other)),
    };
    RecoveryId::from_byte(normalized).ok_or(CryptoError::InvalidRecoveryId(v))
}
