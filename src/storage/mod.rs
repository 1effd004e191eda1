//! Key-value persistence abstraction.
//!
//! The chain store consumes a [`KvStore`] and never assumes a particular
//! backend. [`MemoryKv`] backs tests and ephemeral nodes; a persistent
//! backend implements the same four operations over its own medium.

use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

/// Failures surfaced by a key-value backend.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

/// Minimal key-value interface the engine persists through.
///
/// Implementations must be safe to share across threads; the chain store
/// writes blocks from whichever thread submits them.
pub trait KvStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Removes the value stored under `key`; absent keys are not an error.
    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    /// Returns all pairs whose key starts with `prefix`, ordered by key.
    fn iterate_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;
}

/// In-memory backend over a sorted map.
#[derive(Default)]
pub struct MemoryKv {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let map = self.map.read().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut map = self.map.write().unwrap_or_else(|e| e.into_inner());
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        let mut map = self.map.write().unwrap_or_else(|e| e.into_inner());
        map.remove(key);
        Ok(())
    }

    fn iterate_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let map = self.map.read().unwrap_or_else(|e| e.into_inner());
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
