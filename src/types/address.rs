//! 20-byte account addresses derived from public keys.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use std::fmt;

/// Address length in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Fixed-size 20-byte address identifying accounts and validators.
///
/// Derived from a public key as `SHA3-256(verifying_key)[12..32]`.
/// `Copy` for efficient passing in validation and lookup paths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// Returns the all-zero address, used as a burn/system sentinel.
    pub fn zero() -> Address {
        Address([0u8; ADDRESS_LEN])
    }

    /// Returns the address as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Encode for Address {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.0);
    }
}

impl Decode for Address {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Address(<[u8; ADDRESS_LEN]>::decode(input)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_address_is_all_zero_bytes() {
        assert!(Address::zero().0.iter().all(|&b| b == 0));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let addr = Address([7u8; ADDRESS_LEN]);
        let bytes = addr.to_bytes();
        assert_eq!(bytes.len(), ADDRESS_LEN);
        assert_eq!(Address::from_bytes(&bytes).unwrap(), addr);
    }

    #[test]
    fn display_is_forty_hex_chars() {
        let addr = Address([0xAB; ADDRESS_LEN]);
        assert_eq!(format!("{addr}").len(), 40);
    }
}
