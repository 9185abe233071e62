//! # Typed Rollup Transactions
//!
//! Two EIP-2718 style typed transactions travel between users, the collator
//! and the sequencer:
//!
//! | Type   | Name       | Payload (RLP list)                                                        |
//! |--------|------------|---------------------------------------------------------------------------|
//! | `0x50` | ShutterTx  | chain_id, nonce, gas_tip_cap, gas_fee_cap, gas, encrypted_payload, batch_index, v, r, s |
//! | `0x51` | BatchTx    | chain_id, decryption_key, batch_index, l1_block_number, timestamp, transactions[], v, r, s |
//!
//! ```text
//! raw          = type || rlp([fields..., v, r, s])
//! signing hash = keccak256(type || rlp([fields...]))
//! tx hash      = keccak256(raw)
//! ```
//!
//! `v` is the y-parity (0 or 1) of the recoverable secp256k1 signature.

use rlp::{Rlp, RlpStream};
use shared_crypto::{keccak256, RecoverableSignature, Secp256k1KeyPair};
use shared_types::{Address, Hash, U256};

use crate::domain::errors::CodecError;

/// Encrypted user transaction.
pub const SHUTTER_TX_TYPE: u8 = 0x50;
/// Collator batch transaction.
pub const BATCH_TX_TYPE: u8 = 0x51;

const SHUTTER_TX_FIELDS: usize = 7;
const BATCH_TX_FIELDS: usize = 6;

/// Type byte of an encoded transaction.
pub fn tx_type(raw: &[u8]) -> Result<u8, CodecError> {
    raw.first().copied().ok_or(CodecError::Empty)
}

/// Transaction id: keccak256 of the raw encoding.
pub fn tx_hash(raw: &[u8]) -> Hash {
    keccak256(raw)
}

// =============================================================================
// SHUTTER TX
// =============================================================================

/// User transaction whose payload is encrypted to the batch's epoch id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutterTx {
    pub chain_id: U256,
    pub nonce: u64,
    pub gas_tip_cap: U256,
    pub gas_fee_cap: U256,
    pub gas: u64,
    pub encrypted_payload: Vec<u8>,
    pub batch_index: u64,
    pub signature: Option<RecoverableSignature>,
}

impl ShutterTx {
    fn append_fields(&self, s: &mut RlpStream) {
        s.append(&self.chain_id);
        s.append(&self.nonce);
        s.append(&self.gas_tip_cap);
        s.append(&self.gas_fee_cap);
        s.append(&self.gas);
        s.append(&self.encrypted_payload);
        s.append(&self.batch_index);
    }

    pub fn signing_hash(&self) -> Hash {
        signing_hash(SHUTTER_TX_TYPE, SHUTTER_TX_FIELDS, |s| self.append_fields(s))
    }

    /// Sign with `key`, replacing any existing signature.
    pub fn sign(mut self, key: &Secp256k1KeyPair) -> Result<Self, CodecError> {
        self.signature = Some(key.sign_prehash(&self.signing_hash())?);
        Ok(self)
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let signature = self.signature.as_ref().ok_or(CodecError::Unsigned)?;
        Ok(encode_signed(SHUTTER_TX_TYPE, SHUTTER_TX_FIELDS, signature, |s| {
            self.append_fields(s)
        }))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CodecError> {
        let (rlp, signature) = open_signed(raw, SHUTTER_TX_TYPE, SHUTTER_TX_FIELDS)?;
        Ok(Self {
            chain_id: rlp.val_at(0)?,
            nonce: rlp.val_at(1)?,
            gas_tip_cap: rlp.val_at(2)?,
            gas_fee_cap: rlp.val_at(3)?,
            gas: rlp.val_at(4)?,
            encrypted_payload: rlp.val_at(5)?,
            batch_index: rlp.val_at(6)?,
            signature: Some(signature),
        })
    }

    /// Recover the signer.
    pub fn sender(&self) -> Result<Address, CodecError> {
        let signature = self.signature.as_ref().ok_or(CodecError::Unsigned)?;
        Ok(signature.recover(&self.signing_hash())?)
    }
}

// =============================================================================
// BATCH TX
// =============================================================================

/// Batch of encrypted transactions plus the key that decrypts them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTx {
    pub chain_id: U256,
    pub decryption_key: Vec<u8>,
    pub batch_index: u64,
    pub l1_block_number: u64,
    pub timestamp: u64,
    pub transactions: Vec<Vec<u8>>,
    pub signature: Option<RecoverableSignature>,
}

impl BatchTx {
    fn append_fields(&self, s: &mut RlpStream) {
        s.append(&self.chain_id);
        s.append(&self.decryption_key);
        s.append(&self.batch_index);
        s.append(&self.l1_block_number);
        s.append(&self.timestamp);
        s.begin_list(self.transactions.len());
        for tx in &self.transactions {
            s.append(tx);
        }
    }

    pub fn signing_hash(&self) -> Hash {
        signing_hash(BATCH_TX_TYPE, BATCH_TX_FIELDS, |s| self.append_fields(s))
    }

    pub fn sign(mut self, key: &Secp256k1KeyPair) -> Result<Self, CodecError> {
        self.signature = Some(key.sign_prehash(&self.signing_hash())?);
        Ok(self)
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let signature = self.signature.as_ref().ok_or(CodecError::Unsigned)?;
        Ok(encode_signed(BATCH_TX_TYPE, BATCH_TX_FIELDS, signature, |s| {
            self.append_fields(s)
        }))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CodecError> {
        let (rlp, signature) = open_signed(raw, BATCH_TX_TYPE, BATCH_TX_FIELDS)?;
        Ok(Self {
            chain_id: rlp.val_at(0)?,
            decryption_key: rlp.val_at(1)?,
            batch_index: rlp.val_at(2)?,
            l1_block_number: rlp.val_at(3)?,
            timestamp: rlp.val_at(4)?,
            transactions: rlp.at(5)?.as_list()?,
            signature: Some(signature),
        })
    }

    pub fn sender(&self) -> Result<Address, CodecError> {
        let signature = self.signature.as_ref().ok_or(CodecError::Unsigned)?;
        Ok(signature.recover(&self.signing_hash())?)
    }
}

// =============================================================================
// ENVELOPE HELPERS
// =============================================================================

fn signing_hash(tx_type: u8, fields: usize, append: impl FnOnce(&mut RlpStream)) -> Hash {
    let mut s = RlpStream::new_list(fields);
    append(&mut s);
    let mut data = vec![tx_type];
    data.extend_from_slice(&s.out());
    keccak256(&data)
}

fn encode_signed(
    tx_type: u8,
    fields: usize,
    signature: &RecoverableSignature,
    append: impl FnOnce(&mut RlpStream),
) -> Vec<u8> {
    let mut s = RlpStream::new_list(fields + 3);
    append(&mut s);
    s.append(&u64::from(signature.v()));
    s.append(&U256::from_big_endian(&signature.r()));
    s.append(&U256::from_big_endian(&signature.s()));
    let mut raw = vec![tx_type];
    raw.extend_from_slice(&s.out());
    raw
}

/// Check the type byte and list shape; return the list and the signature.
fn open_signed(
    raw: &[u8],
    expected_type: u8,
    fields: usize,
) -> Result<(Rlp<'_>, RecoverableSignature), CodecError> {
    let actual = tx_type(raw)?;
    if actual != expected_type {
        return Err(CodecError::UnexpectedType(actual));
    }
    let payload = &raw[1..];
    let rlp = Rlp::new(payload);
    let info = rlp.payload_info()?;
    if info.header_len + info.value_len != payload.len() {
        return Err(CodecError::Rlp("trailing bytes".to_string()));
    }
    if !rlp.is_list() || rlp.item_count()? != fields + 3 {
        return Err(CodecError::Rlp(format!("expected list of {} items", fields + 3)));
    }

    let v: u64 = rlp.val_at(fields)?;
    let v = u8::try_from(v).map_err(|_| CodecError::Overflow { field: "v", bits: 8 })?;
    let r = u256_to_bytes(rlp.val_at(fields + 1)?);
    let s = u256_to_bytes(rlp.val_at(fields + 2)?);
    Ok((rlp, RecoverableSignature::from_parts(&r, &s, v)))
}

fn u256_to_bytes(value: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Secp256k1KeyPair {
        Secp256k1KeyPair::from_bytes([7u8; 32]).unwrap()
    }

    fn shutter_tx() -> ShutterTx {
        ShutterTx {
            chain_id: U256::from(1337),
            nonce: 3,
            gas_tip_cap: U256::from(1),
            gas_fee_cap: U256::from(2),
            gas: 21000,
            encrypted_payload: vec![0xaa; 40],
            batch_index: 9,
            signature: None,
        }
    }

    #[test]
    fn test_shutter_tx_decode_recovers_sender() {
        let tx = shutter_tx().sign(&key()).unwrap();
        let raw = tx.encode().unwrap();
        assert_eq!(raw[0], SHUTTER_TX_TYPE);

        let decoded = ShutterTx::decode(&raw).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.sender().unwrap(), key().address());
    }

    #[test]
    fn test_unsigned_tx_cannot_be_encoded() {
        assert_eq!(shutter_tx().encode(), Err(CodecError::Unsigned));
    }

    #[test]
    fn test_signature_covers_batch_index() {
        let tx = shutter_tx().sign(&key()).unwrap();
        let mut tampered = tx.clone();
        tampered.batch_index += 1;
        assert_ne!(tampered.sender().ok(), Some(key().address()));
    }

    #[test]
    fn test_wrong_type_byte() {
        let mut raw = shutter_tx().sign(&key()).unwrap().encode().unwrap();
        raw[0] = BATCH_TX_TYPE;
        assert_eq!(
            ShutterTx::decode(&raw),
            Err(CodecError::UnexpectedType(BATCH_TX_TYPE))
        );
        assert_eq!(ShutterTx::decode(&[]), Err(CodecError::Empty));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut raw = shutter_tx().sign(&key()).unwrap().encode().unwrap();
        raw.push(0);
        assert!(matches!(ShutterTx::decode(&raw), Err(CodecError::Rlp(_))));
    }

    #[test]
    fn test_batch_tx_carries_transactions() {
        let user_tx = shutter_tx().sign(&key()).unwrap().encode().unwrap();
        let batch = BatchTx {
            chain_id: U256::from(1337),
            decryption_key: b"key1".to_vec(),
            batch_index: 1,
            l1_block_number: 42,
            timestamp: 1_700_000_000,
            transactions: vec![user_tx.clone(), user_tx],
            signature: None,
        }
        .sign(&key())
        .unwrap();

        let raw = batch.encode().unwrap();
        let decoded = BatchTx::decode(&raw).unwrap();
        assert_eq!(decoded.transactions.len(), 2);
        assert_eq!(decoded.sender().unwrap(), key().address());
        assert_eq!(tx_hash(&raw), keccak256(&raw));
    }
}
