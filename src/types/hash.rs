//! 32-byte SHA3-256 hash type with zero-allocation operations.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use sha3::{Digest, Sha3_256};
use std::fmt;
use std::sync::Mutex;

/// SHA3-256 hash length in bytes.
pub const HASH_LEN: usize = 32;

/// Fixed-size 32-byte hash used throughout the engine.
///
/// This type is `Copy` for performance - hashes are passed frequently during
/// block validation and fork-choice and should live on the stack.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    /// Creates a zero-valued hash (all bytes are 0x00).
    ///
    /// Used as a sentinel for the genesis parent and the empty Merkle root.
    pub fn zero() -> Hash {
        Hash([0u8; HASH_LEN])
    }

    /// Returns the hash as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Creates a hash from a slice, returning `None` if it is not 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Hash> {
        <[u8; HASH_LEN]>::try_from(bytes).ok().map(Hash)
    }

    /// Creates a new SHA3-256 hash builder for incremental hashing.
    pub fn sha3() -> HashBuilder {
        HashBuilder::new()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Encode for Hash {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.0);
    }
}

impl Decode for Hash {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Hash(<[u8; HASH_LEN]>::decode(input)?))
    }
}

/// Incremental SHA3-256 hash builder.
///
/// Allows feeding data in chunks and finalizing to produce a [`Hash`].
/// Implements [`EncodeSink`] so encodable types can be hashed directly
/// without intermediate byte buffers.
pub struct HashBuilder {
    hasher: Sha3_256,
}

impl HashBuilder {
    /// Creates a new hash builder with empty state.
    pub fn new() -> Self {
        Self {
            hasher: Sha3_256::new(),
        }
    }

    /// Feeds data into the hash computation.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Feeds data and returns the builder for call chaining.
    pub fn chain(mut self, data: &[u8]) -> Self {
        self.hasher.update(data);
        self
    }

    /// Consumes the builder and returns the final hash.
    pub fn finalize(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for HashBuilder {
    fn write(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }
}

/// Lazily computed hash cached per chain id.
///
/// Transactions and headers are hashed repeatedly during validation and
/// fork-choice; the cache makes every lookup after the first O(1). The cached
/// value is keyed by chain id so a cache populated for one chain is never
/// served for another.
///
/// Excluded from equality and serialization: two values that encode the same
/// bytes are equal regardless of cache population.
#[derive(Debug, Default)]
pub struct HashCache(Mutex<Option<(u64, Hash)>>);

impl HashCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self(Mutex::new(None))
    }

    /// Returns the cached hash for `chain_id`, computing and storing it on miss.
    pub fn get_or_compute(&self, chain_id: u64, compute: impl FnOnce() -> Hash) -> Hash {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((id, hash)) = *slot {
            if id == chain_id {
                return hash;
            }
        }
        let hash = compute();
        *slot = Some((chain_id, hash));
        hash
    }
}

impl Clone for HashCache {
    fn clone(&self) -> Self {
        let slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        Self(Mutex::new(*slot))
    }
}

impl PartialEq for HashCache {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for HashCache {}
