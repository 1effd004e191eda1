//! Canonical chain selection over a forest of blocks.

mod store;

pub use store::{ChainError, ChainStore, Outcome, ReorgInfo, MAX_BLOCK_TIME_DRIFT_SECS};
