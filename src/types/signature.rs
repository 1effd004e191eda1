//! Serializable wrapper around Schnorr signatures.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use k256::schnorr::Signature;

/// Schnorr signature length in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Wrapper around `k256::schnorr::Signature` that implements the binary codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializableSignature(pub Signature);

impl From<Signature> for SerializableSignature {
    fn from(sig: Signature) -> Self {
        SerializableSignature(sig)
    }
}

impl Encode for SerializableSignature {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.0.to_bytes());
    }
}

impl Decode for SerializableSignature {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = <[u8; SIGNATURE_LEN]>::decode(input)?;
        let sig = Signature::try_from(bytes.as_slice()).map_err(|_| DecodeError::InvalidValue)?;
        Ok(SerializableSignature(sig))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_pair::PrivateKey;

    #[test]
    fn encode_decode_roundtrip() {
        let key = PrivateKey::new();
        let sig = key.sign(b"payload");

        let bytes = sig.to_bytes();
        assert_eq!(bytes.len(), SIGNATURE_LEN);
        assert_eq!(SerializableSignature::from_bytes(&bytes).unwrap(), sig);
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let result = SerializableSignature::from_bytes(&[0u8; 10]);
        assert!(result.is_err());
    }
}
