//! Primitive types used throughout the engine.
//!
//! - `Hash`: fixed-size 32-byte SHA3-256 hashes with incremental building
//! - `Address`: 20-byte account identifiers derived from public keys
//! - `encoding`: deterministic binary serialization traits
//! - `merkle_tree`: Merkle roots and inclusion proofs over transaction ids

pub mod address;
pub mod encoding;
pub mod hash;
pub mod merkle_tree;
pub mod signature;
