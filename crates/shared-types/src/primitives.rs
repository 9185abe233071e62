//! # Primitive Types
//!
//! Fixed-size byte aliases in the Ethereum convention plus the 256-bit integer
//! used for balances and fees.

use crate::errors::TypesError;

/// 32-byte hash (SHA3-256 or Keccak-256 depending on context).
pub type Hash = [u8; 32];

/// 20-byte Ethereum account address.
pub type Address = [u8; 20];

/// 256-bit unsigned integer for balances, fees and chain ids.
pub use primitive_types::U256;

/// Render an address as `0x`-prefixed lowercase hex.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Parse a `0x`-prefixed (or bare) hex string into an address.
pub fn address_from_hex(s: &str) -> Result<Address, TypesError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
    if bytes.len() != 20 {
        return Err(TypesError::InvalidLength {
            expected: 20,
            actual: bytes.len(),
        });
    }
    let mut address = [0u8; 20];
    address.copy_from_slice(&bytes);
    Ok(address)
}
