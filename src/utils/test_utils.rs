//! Shared helpers for unit tests.

#[cfg(test)]
pub mod utils {
    use crate::core::block::{Block, Header, Seal};
    use crate::core::transaction::{Transaction, TxKind};
    use crate::crypto::key_pair::PrivateKey;
    use crate::types::address::{ADDRESS_LEN, Address};
    use crate::types::hash::{HASH_LEN, Hash};
    use crate::types::merkle_tree::MerkleTree;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    /// Returns a unique hash per call, stable within a test run.
    pub fn random_hash() -> Hash {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut value = [0u8; HASH_LEN];
        value[..8].copy_from_slice(&n.to_le_bytes());
        Hash(value)
    }

    /// Returns a unique recipient address per call.
    pub fn random_address() -> Address {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut value = [0u8; ADDRESS_LEN];
        value[..8].copy_from_slice(&n.to_le_bytes());
        Address(value)
    }

    /// Creates a signed transfer to a fresh recipient.
    pub fn transfer_tx(
        key: &PrivateKey,
        nonce: u64,
        amount: u128,
        fee: u128,
        chain_id: u64,
    ) -> Transaction {
        Transaction::new(
            TxKind::Transfer,
            random_address(),
            amount,
            fee,
            nonce,
            1_700_000_000,
            key,
            chain_id,
        )
    }

    /// Builds a signed block with the given seal over `transactions`.
    ///
    /// The header's Merkle root and producer address are derived; the seal
    /// is taken as-is, so proof validity is up to the caller.
    pub fn sealed_block(
        height: u64,
        previous_block: Hash,
        timestamp: u64,
        transactions: Vec<Transaction>,
        producer: &PrivateKey,
        seal: Seal,
        chain_id: u64,
    ) -> Block {
        let header = Header {
            height,
            timestamp,
            previous_block,
            merkle_root: MerkleTree::from_transactions(&transactions, chain_id),
            producer: producer.address(),
            seal,
        };
        Block::new(header, producer, transactions, chain_id)
    }
}
