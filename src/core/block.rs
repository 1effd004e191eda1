//! Block and header structures with consensus seals.

use crate::core::ValidationError;
use crate::core::transaction::Transaction;
use crate::crypto::key_pair::{PrivateKey, PublicKey};
use crate::types::address::Address;
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::{Hash, HashCache};
use crate::types::merkle_tree::MerkleTree;
use crate::types::signature::SerializableSignature;

/// Consensus proof carried in the block header.
///
/// The seal is part of the header hash, so mining a proof-of-work nonce
/// reshuffles the hash and the producer signature binds to the final seal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seal {
    /// Proof-of-work: the header hash must fall below the difficulty target.
    Pow { nonce: u64, difficulty: u64 },
    /// Proof-of-stake: deterministic producer draw for `slot` from `seed`.
    Pos { slot: u32, seed: Hash },
}

impl Seal {
    /// Returns the claimed difficulty for proof-of-work seals.
    pub fn difficulty(&self) -> Option<u64> {
        match self {
            Seal::Pow { difficulty, .. } => Some(*difficulty),
            Seal::Pos { .. } => None,
        }
    }

    /// Returns the slot index for proof-of-stake seals.
    pub fn slot(&self) -> Option<u32> {
        match self {
            Seal::Pow { .. } => None,
            Seal::Pos { slot, .. } => Some(*slot),
        }
    }
}

impl Encode for Seal {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        match self {
            Seal::Pow { nonce, difficulty } => {
                0u8.encode(out);
                nonce.encode(out);
                difficulty.encode(out);
            }
            Seal::Pos { slot, seed } => {
                1u8.encode(out);
                slot.encode(out);
                seed.encode(out);
            }
        }
    }
}

impl Decode for Seal {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(Seal::Pow {
                nonce: u64::decode(input)?,
                difficulty: u64::decode(input)?,
            }),
            1 => Ok(Seal::Pos {
                slot: u32::decode(input)?,
                seed: Hash::decode(input)?,
            }),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

/// Block header containing metadata and cryptographic commitments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Block index in the chain (genesis = 0).
    pub height: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Hash of the parent block, forming the chain.
    pub previous_block: Hash,
    /// Merkle root over transaction ids.
    pub merkle_root: Hash,
    /// Address of the block producer.
    pub producer: Address,
    /// Consensus proof for this block.
    pub seal: Seal,
}

impl Header {
    /// Computes the chain-specific hash of this header.
    ///
    /// Includes a domain separator and the chain id so a header hash from
    /// one chain is meaningless on another.
    pub fn hash(&self, chain_id: u64) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"BLOCK_HEADER");
        chain_id.encode(&mut h);
        self.encode(&mut h);
        h.finalize()
    }
}

impl Encode for Header {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.height.encode(out);
        self.timestamp.encode(out);
        self.previous_block.encode(out);
        self.merkle_root.encode(out);
        self.producer.encode(out);
        self.seal.encode(out);
    }
}

impl Decode for Header {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Header {
            height: u64::decode(input)?,
            timestamp: u64::decode(input)?,
            previous_block: Hash::decode(input)?,
            merkle_root: Hash::decode(input)?,
            producer: Address::decode(input)?,
            seal: Seal::decode(input)?,
        })
    }
}

/// Constructs the data a producer signs when sealing a block.
///
/// A domain separator, the chain id, and the header hash bind the signature
/// to one block on one chain. Also used when checking double-sign evidence.
pub fn block_sign_data(chain_id: u64, hash: &Hash) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5 + 8 + 32);
    buf.extend_from_slice(b"BLOCK");
    chain_id.encode(&mut buf);
    hash.encode(&mut buf);
    buf
}

/// Immutable block containing a header and transactions.
///
/// Blocks are validated once upon receipt and never modified. The header
/// hash is lazily computed and cached for O(1) subsequent lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    /// Public key of the producer; must match `header.producer`.
    pub producer_key: PublicKey,
    /// Producer signature over the header hash.
    pub signature: SerializableSignature,
    pub transactions: Box<[Transaction]>,

    /// Lazily computed header hash, do not use directly.
    cached_header_hash: HashCache,
}

impl Block {
    /// Creates a new block signed by the producer key.
    ///
    /// The signature covers the header hash, which itself commits to the
    /// seal, so the proof must be final before calling this.
    pub fn new(
        header: Header,
        producer: &PrivateKey,
        transactions: Vec<Transaction>,
        chain_id: u64,
    ) -> Self {
        let hash = header.hash(chain_id);
        Self {
            header,
            producer_key: producer.public_key(),
            signature: producer.sign(block_sign_data(chain_id, &hash).as_slice()),
            transactions: transactions.into_boxed_slice(),
            cached_header_hash: HashCache::new(),
        }
    }

    /// Returns the chain-specific header hash, computing and caching it on first call.
    pub fn header_hash(&self, chain_id: u64) -> Hash {
        self.cached_header_hash
            .get_or_compute(chain_id, || self.header.hash(chain_id))
    }

    /// Verifies the block's structural integrity.
    ///
    /// Checks that:
    /// - the producer address matches the producer key,
    /// - the producer signature is valid for the header hash,
    /// - every transaction signature is valid for this chain,
    /// - the Merkle root matches the transactions.
    ///
    /// Stateful rules (nonces, balances, consensus proof) are checked by the
    /// state machine and the consensus strategy, not here.
    pub fn verify(&self, chain_id: u64) -> Result<(), ValidationError> {
        let hash = self.header_hash(chain_id);

        if self.producer_key.address != self.header.producer {
            return Err(ValidationError::ProducerMismatch(hash));
        }

        if !self
            .producer_key
            .verify(block_sign_data(chain_id, &hash).as_slice(), self.signature)
        {
            return Err(ValidationError::InvalidSignature(hash));
        }

        for tx in &self.transactions {
            if !tx.verify(chain_id) {
                return Err(ValidationError::InvalidTransactionSignature(hash));
            }
        }

        if MerkleTree::from_transactions(&self.transactions, chain_id) != self.header.merkle_root {
            return Err(ValidationError::MerkleRootMismatch(hash));
        }

        Ok(())
    }
}

impl Encode for Block {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.header.encode(out);
        self.producer_key.encode(out);
        self.signature.encode(out);
        self.transactions.encode(out);
    }
}

impl Decode for Block {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Block {
            header: Header::decode(input)?,
            producer_key: PublicKey::decode(input)?,
            signature: SerializableSignature::decode(input)?,
            transactions: Box::<[Transaction]>::decode(input)?,
            cached_header_hash: HashCache::new(),
        })
    }
}
