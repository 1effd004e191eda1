//! Schnorr signature key pairs on secp256k1.

use crate::types::address::{ADDRESS_LEN, Address};
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::signature::SerializableSignature;
use k256::ecdsa::signature::Signer;
use k256::schnorr::signature::Verifier;
use k256::schnorr::{SigningKey, VerifyingKey};
use rand_core::OsRng;
use sha3::{Digest, Sha3_256};

/// Private key for signing transactions and blocks.
///
/// Generated using cryptographically secure randomness from the OS.
/// Never serialized or transmitted.
#[derive(Clone)]
pub struct PrivateKey {
    key: SigningKey,
}

/// Public key for signature verification and address derivation.
///
/// The address is derived by hashing the verifying key with SHA3-256 and
/// taking the last 20 bytes.
///
/// `Copy` (52 bytes: 32 for the key plus 20 for the address) because public
/// keys are passed on every transaction and block verification.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    pub key: VerifyingKey,
    pub address: Address,
}

impl PrivateKey {
    /// Generates a new random private key using OS-provided entropy.
    pub fn new() -> Self {
        let mut rng = OsRng;
        Self {
            key: SigningKey::random(&mut rng),
        }
    }

    /// Creates a private key from raw bytes.
    ///
    /// Returns `None` if the bytes do not represent a valid scalar for secp256k1.
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        SigningKey::from_bytes(bytes).ok().map(|key| Self { key })
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self)
    }

    /// Returns the address of the corresponding public key.
    pub fn address(&self) -> Address {
        self.public_key().address
    }

    /// Signs arbitrary data, producing a Schnorr signature.
    pub fn sign(&self, data: &[u8]) -> SerializableSignature {
        SerializableSignature(self.key.sign(data))
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

fn derive_address(key: &VerifyingKey) -> Address {
    let mut hasher = Sha3_256::new();
    hasher.update(key.to_bytes());
    let full: [u8; 32] = hasher.finalize().into();

    let mut addr = [0u8; ADDRESS_LEN];
    addr.copy_from_slice(&full[12..]);
    Address(addr)
}

impl PublicKey {
    /// Derives a public key from a private key and computes its address.
    ///
    /// Address derivation: SHA3-256(verifying_key_bytes)[12..32]
    pub(crate) fn new(private: &PrivateKey) -> Self {
        let vk = private.key.verifying_key();
        PublicKey {
            key: *vk,
            address: derive_address(vk),
        }
    }

    /// Verifies a Schnorr signature against the given data.
    pub fn verify(&self, data: &[u8], signature: SerializableSignature) -> bool {
        self.key.verify(data, &signature.0).is_ok()
    }
}

impl Encode for PublicKey {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.key.to_bytes());
    }
}

impl Decode for PublicKey {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let key_bytes = <[u8; 32]>::decode(input)?;
        let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| DecodeError::InvalidValue)?;

        // Re-derive the address so the key/address invariant always holds.
        Ok(PublicKey {
            address: derive_address(&key),
            key,
        })
    }
}
