//! Double-sign evidence verification.
//!
//! Evidence packages two distinct headers for the same height, both signed
//! by the same producer key. Verification is purely cryptographic and needs
//! no chain state; applying the penalty afterwards is the state machine's
//! job via [`StateMachine::apply_double_sign_penalty`].
//!
//! [`StateMachine::apply_double_sign_penalty`]: crate::state::StateMachine::apply_double_sign_penalty

use crate::core::block::{Header, block_sign_data};
use crate::crypto::key_pair::PublicKey;
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::signature::SerializableSignature;
use thiserror::Error;

/// Reasons evidence is rejected as not proving a double-sign.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlashingEvidenceError {
    #[error("headers are for heights {a} and {b}, not the claimed height {claimed}")]
    HeightMismatch { claimed: u64, a: u64, b: u64 },
    #[error("both headers hash identically; one block is not an offense")]
    IdenticalHeaders,
    #[error("a header names a producer other than the accused key")]
    ProducerMismatch,
    #[error("a signature does not verify against the accused key")]
    BadSignature,
}

/// Proof that one producer signed two conflicting headers at the same height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoubleSignEvidence {
    /// Height both conflicting headers claim.
    pub height: u64,
    /// Key of the accused producer.
    pub producer_key: PublicKey,
    pub header_a: Header,
    pub signature_a: SerializableSignature,
    pub header_b: Header,
    pub signature_b: SerializableSignature,
}

impl DoubleSignEvidence {
    /// Checks that this evidence proves a double-sign on `chain_id`.
    pub fn verify(&self, chain_id: u64) -> Result<(), SlashingEvidenceError> {
        if self.header_a.height != self.height || self.header_b.height != self.height {
            return Err(SlashingEvidenceError::HeightMismatch {
                claimed: self.height,
                a: self.header_a.height,
                b: self.header_b.height,
            });
        }

        let producer = self.producer_key.address;
        if self.header_a.producer != producer || self.header_b.producer != producer {
            return Err(SlashingEvidenceError::ProducerMismatch);
        }

        let hash_a = self.header_a.hash(chain_id);
        let hash_b = self.header_b.hash(chain_id);
        if hash_a == hash_b {
            return Err(SlashingEvidenceError::IdenticalHeaders);
        }

        let signed_a = block_sign_data(chain_id, &hash_a);
        let signed_b = block_sign_data(chain_id, &hash_b);
        if !self.producer_key.verify(&signed_a, self.signature_a)
            || !self.producer_key.verify(&signed_b, self.signature_b)
        {
            return Err(SlashingEvidenceError::BadSignature);
        }

        Ok(())
    }
}

impl Encode for DoubleSignEvidence {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.height.encode(out);
        self.producer_key.encode(out);
        self.header_a.encode(out);
        self.signature_a.encode(out);
        self.header_b.encode(out);
        self.signature_b.encode(out);
    }
}

impl Decode for DoubleSignEvidence {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(DoubleSignEvidence {
            height: u64::decode(input)?,
            producer_key: PublicKey::decode(input)?,
            header_a: Header::decode(input)?,
            signature_a: SerializableSignature::decode(input)?,
            header_b: Header::decode(input)?,
            signature_b: SerializableSignature::decode(input)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::Seal;
    use crate::crypto::key_pair::PrivateKey;
    use crate::types::hash::Hash;
    use crate::utils::test_utils::utils::random_hash;

    const TEST_CHAIN_ID: u64 = 11;

    fn signed_header(key: &PrivateKey, height: u64, parent: Hash) -> (Header, SerializableSignature) {
        let header = Header {
            height,
            timestamp: 1_700_000_000,
            previous_block: parent,
            merkle_root: Hash::zero(),
            producer: key.address(),
            seal: Seal::Pow {
                nonce: 0,
                difficulty: 1,
            },
        };
        let signature = key.sign(&block_sign_data(TEST_CHAIN_ID, &header.hash(TEST_CHAIN_ID)));
        (header, signature)
    }

    fn conflicting_evidence(key: &PrivateKey, height: u64) -> DoubleSignEvidence {
        let (header_a, signature_a) = signed_header(key, height, random_hash());
        let (header_b, signature_b) = signed_header(key, height, random_hash());
        DoubleSignEvidence {
            height,
            producer_key: key.public_key(),
            header_a,
            signature_a,
            header_b,
            signature_b,
        }
    }

    #[test]
    fn valid_evidence_verifies() {
        let key = PrivateKey::new();
        assert!(conflicting_evidence(&key, 5).verify(TEST_CHAIN_ID).is_ok());
    }

    #[test]
    fn rejects_height_mismatch() {
        let key = PrivateKey::new();
        let mut evidence = conflicting_evidence(&key, 5);
        evidence.height = 6;
        assert!(matches!(
            evidence.verify(TEST_CHAIN_ID),
            Err(SlashingEvidenceError::HeightMismatch { .. })
        ));
    }

    #[test]
    fn rejects_duplicated_header() {
        let key = PrivateKey::new();
        let mut evidence = conflicting_evidence(&key, 5);
        evidence.header_b = evidence.header_a.clone();
        evidence.signature_b = evidence.signature_a;
        assert_eq!(
            evidence.verify(TEST_CHAIN_ID),
            Err(SlashingEvidenceError::IdenticalHeaders)
        );
    }

    #[test]
    fn rejects_foreign_producer() {
        let key = PrivateKey::new();
        let mut evidence = conflicting_evidence(&key, 5);
        evidence.producer_key = PrivateKey::new().public_key();
        assert_eq!(
            evidence.verify(TEST_CHAIN_ID),
            Err(SlashingEvidenceError::ProducerMismatch)
        );
    }

    #[test]
    fn rejects_forged_signature() {
        let key = PrivateKey::new();
        let forger = PrivateKey::new();
        let mut evidence = conflicting_evidence(&key, 5);
        let hash = evidence.header_b.hash(TEST_CHAIN_ID);
        evidence.signature_b = forger.sign(&block_sign_data(TEST_CHAIN_ID, &hash));
        assert_eq!(
            evidence.verify(TEST_CHAIN_ID),
            Err(SlashingEvidenceError::BadSignature)
        );
    }

    #[test]
    fn rejects_signatures_from_another_chain() {
        let key = PrivateKey::new();
        let evidence = conflicting_evidence(&key, 5);
        assert!(evidence.verify(TEST_CHAIN_ID + 1).is_err());
    }

    #[test]
    fn codec_roundtrip() {
        let key = PrivateKey::new();
        let evidence = conflicting_evidence(&key, 5);
        let bytes = evidence.to_bytes();
        let decoded = DoubleSignEvidence::from_bytes(&bytes).expect("decode");
        assert_eq!(decoded, evidence);
        assert!(decoded.verify(TEST_CHAIN_ID).is_ok());
    }
}
