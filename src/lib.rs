//! Ledger and consensus engine.
//!
//! Provides the block/transaction data model, Merkle verification, a
//! deterministic state machine with rollback deltas, a fee-prioritized
//! mempool, pluggable proof-of-work and proof-of-stake consensus with
//! validator slashing, and a fork-aware chain store with reorg resolution.

pub mod chain;
pub mod consensus;
pub mod core;
pub mod crypto;
pub mod mempool;
pub mod state;
pub mod storage;
pub mod types;
pub mod utils;
