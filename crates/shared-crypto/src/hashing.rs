//! # Hashing
//!
//! SHA3-256 for canonical message hashes, Keccak-256 for Ethereum addresses
//! and transaction ids.

use sha3::{Digest, Keccak256, Sha3_256};
use shared_types::Hash;

/// SHA3-256 (FIPS 202) of `data`.
pub fn sha3_256(data: &[u8]) -> Hash {
    Sha3_256::digest(data).into()
}

/// Keccak-256 (pre-standard padding, as used by Ethereum) of `data`.
pub fn keccak256(data: &[u8]) -> Hash {
    Keccak256::digest(data).into()
}

/// Canonical hash of an ordered list of byte strings:
/// `sha3_256( concat_i sha3_256(item_i) )`.
///
/// The result depends only on the order and content of the items.
pub fn hash_byte_list<I, T>(items: I) -> Hash
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut hasher = Sha3_256::new();
    for item in items {
        hasher.update(sha3_256(item.as_ref()));
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha3_known_vector() {
        // SHA3-256("")
        assert_eq!(
            hex::encode(sha3_256(b"")),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
    }

    #[test]
    fn test_keccak_known_vector() {
        // Keccak-256("")
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_hash_byte_list_matches_manual() {
        let a = b"tx0".to_vec();
        let b = b"tx1".to_vec();
        let mut concat = Vec::new();
        concat.extend_from_slice(&sha3_256(&a));
        concat.extend_from_slice(&sha3_256(&b));

        assert_eq!(hash_byte_list([&a, &b]), sha3_256(&concat));
    }

    #[test]
    fn test_hash_byte_list_order_sensitive() {
        let a = b"a".to_vec();
        let b = b"b".to_vec();
        assert_ne!(hash_byte_list([&a, &b]), hash_byte_list([&b, &a]));
    }

    #[test]
    fn test_hash_byte_list_empty() {
        assert_eq!(hash_byte_list(Vec::<Vec<u8>>::new()), sha3_256(b""));
    }
}
