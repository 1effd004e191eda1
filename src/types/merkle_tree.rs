//! Merkle tree over transaction ids with inclusion proofs.
//!
//! Behavior:
//! - An empty list of leaves yields the all-zero hash (`Hash::zero()`).
//! - Odd levels are padded by duplicating the last node before hashing pairs.
//! - Root construction is performed in-place to minimize allocations.
//! - Proofs carry the sibling hash and its side for every level; verification
//!   fails closed on any mismatch.

use crate::core::transaction::Transaction;
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::Hash;

const EMPTY_ROOT: Hash = Hash([0u8; 32]);
const MERKLE_NODE_SEPARATION: &[u8] = b"MERKLE_NODE";

/// A single level of an inclusion proof: the sibling hash and its side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofStep {
    /// Hash of the sibling node at this level.
    pub sibling: Hash,
    /// True when the sibling sits to the left of the running hash.
    pub sibling_on_left: bool,
}

impl Encode for ProofStep {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.sibling.encode(out);
        self.sibling_on_left.encode(out);
    }
}

impl Decode for ProofStep {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(ProofStep {
            sibling: Hash::decode(input)?,
            sibling_on_left: bool::decode(input)?,
        })
    }
}

/// Inclusion proof for a single leaf, ordered leaf-to-root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub steps: Vec<ProofStep>,
}

impl Encode for MerkleProof {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.steps.encode(out);
    }
}

impl Decode for MerkleProof {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(MerkleProof {
            steps: Vec::<ProofStep>::decode(input)?,
        })
    }
}

/// Utility functions to build Merkle roots and proofs from hashes or transactions.
pub struct MerkleTree;

impl MerkleTree {
    fn hash_pair(left: Hash, right: Hash) -> Hash {
        let mut h = Hash::sha3();
        h.update(MERKLE_NODE_SEPARATION);
        h.update(left.as_slice());
        h.update(right.as_slice());
        h.finalize()
    }

    /// Computes a Merkle root from the provided leaf hashes.
    ///
    /// Performs an in-place reduction; when a level has an odd number of
    /// nodes the last node is duplicated for hashing that pair.
    /// Returns the zero hash when `nodes` is empty.
    pub fn from_raw(mut nodes: Vec<Hash>) -> Hash {
        if nodes.is_empty() {
            return EMPTY_ROOT;
        }

        let mut len = nodes.len();

        while len > 1 {
            let mut write = 0;
            let mut read = 0;

            while read < len {
                let left = nodes[read];
                let right = if read + 1 < len {
                    nodes[read + 1]
                } else {
                    left
                };

                nodes[write] = Self::hash_pair(left, right);

                write += 1;
                read += 2;
            }

            len = write;
        }

        nodes[0]
    }

    /// Computes a Merkle root from transactions, using `tx.id(chain_id)` as leaves.
    ///
    /// Returns the zero hash when `txs` is empty.
    pub fn from_transactions(txs: &[Transaction], chain_id: u64) -> Hash {
        if txs.is_empty() {
            return EMPTY_ROOT;
        }

        let mut nodes = Vec::with_capacity(txs.len());
        for tx in txs {
            nodes.push(tx.id(chain_id));
        }

        Self::from_raw(nodes)
    }

    /// Builds an inclusion proof for the leaf at `index`.
    ///
    /// Returns `None` when `index` is out of range or `leaves` is empty.
    /// The proof pairs with [`MerkleTree::verify`] against the root produced
    /// by [`MerkleTree::from_raw`] over the same leaves.
    pub fn prove(leaves: &[Hash], index: usize) -> Option<MerkleProof> {
        if index >= leaves.len() {
            return None;
        }

        let mut level = leaves.to_vec();
        let mut idx = index;
        let mut steps = Vec::new();

        while level.len() > 1 {
            let sibling_idx = idx ^ 1;
            // Odd level: the last node pairs with itself.
            let sibling = if sibling_idx < level.len() {
                level[sibling_idx]
            } else {
                level[idx]
            };
            steps.push(ProofStep {
                sibling,
                sibling_on_left: idx % 2 == 1,
            });

            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut read = 0;
            while read < level.len() {
                let left = level[read];
                let right = if read + 1 < level.len() {
                    level[read + 1]
                } else {
                    left
                };
                next.push(Self::hash_pair(left, right));
                read += 2;
            }

            level = next;
            idx /= 2;
        }

        Some(MerkleProof { steps })
    }

    /// Verifies that `leaf` is included under `root` via `proof`.
    ///
    /// Returns `false` for any mismatch; a tampered leaf, sibling, side flag,
    /// or root all fail. An empty proof only verifies the single-leaf tree
    /// where the leaf is the root.
    pub fn verify(leaf: Hash, proof: &MerkleProof, root: Hash) -> bool {
        let mut acc = leaf;
        for step in &proof.steps {
            acc = if step.sibling_on_left {
                Self::hash_pair(step.sibling, acc)
            } else {
                Self::hash_pair(acc, step.sibling)
            };
        }
        acc == root
    }
}
