//! Core data model: transactions, blocks, accounts, and chain parameters.

pub mod account;
pub mod block;
pub mod params;
pub mod transaction;

use crate::types::address::Address;
use crate::types::hash::Hash;
use thiserror::Error;

/// Rejection of a structurally or stateful-invalid block or transaction.
///
/// Raised both by structural verification (`Block::verify`) and by stateful
/// application in the state machine. Every variant is a deterministic
/// rejection: the same input fails the same way on every node.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("block {0}: producer signature does not verify")]
    InvalidSignature(Hash),
    #[error("block {0}: producer address does not match producer key")]
    ProducerMismatch(Hash),
    #[error("block {0}: transaction signature does not verify")]
    InvalidTransactionSignature(Hash),
    #[error("block {0}: merkle root does not match transactions")]
    MerkleRootMismatch(Hash),
    #[error("block {block}: height {got} does not follow parent height {parent}")]
    WrongHeight { block: Hash, parent: u64, got: u64 },
    #[error("block {block}: timestamp {got} outside window [{min}, {max}]")]
    TimestampOutOfBounds {
        block: Hash,
        got: u64,
        min: u64,
        max: u64,
    },
    #[error("account {address}: expected nonce {expected}, transaction carries {got}")]
    NonceMismatch {
        address: Address,
        expected: u64,
        got: u64,
    },
    #[error("account {address}: balance {available} cannot cover {required}")]
    InsufficientBalance {
        address: Address,
        required: u128,
        available: u128,
    },
    #[error("account {address}: stake deposit below minimum ({got} < {min})")]
    StakeBelowMinimum {
        address: Address,
        got: u128,
        min: u128,
    },
    #[error("account {address}: no validator record for unstake request")]
    NotAValidator { address: Address },
    #[error("account {address}: unstake amount {got} exceeds bonded stake {bonded}")]
    UnstakeExceedsBond {
        address: Address,
        got: u128,
        bonded: u128,
    },
}
