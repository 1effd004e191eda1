//! Proof-of-stake producer selection.
//!
//! Each (parent, height, slot) triple derives a deterministic seed, and the
//! seed draws one producer from the active validator set weighted by stake.
//! Every node holding the same state derives the same producer, so a block
//! sealed by anyone else is rejected without any vote exchange. If the slot's
//! producer stays silent the next slot opens with a fresh seed, which is what
//! the state machine later counts as a miss for the silent validator.

use crate::consensus::ConsensusError;
use crate::core::block::{Block, Seal};
use crate::core::params::{ChainParams, ConsensusKind};
use crate::state::StateMachine;
use crate::types::address::Address;
use crate::types::encoding::Encode;
use crate::types::hash::Hash;

/// Derives the deterministic seed for one slot of one prospective block.
pub fn seed(chain_id: u64, parent_hash: Hash, height: u64, slot: u32) -> Hash {
    let mut h = Hash::sha3();
    h.update(b"POS_SEED");
    chain_id.encode(&mut h);
    parent_hash.encode(&mut h);
    height.encode(&mut h);
    slot.encode(&mut h);
    h.finalize()
}

/// Draws one producer from `active`, weighted by stake.
///
/// `active` must be ordered by address so every node walks the cumulative
/// stake in the same order; [`StateMachine::active_validators`] returns it
/// that way. Returns `None` when the set is empty or carries no stake.
pub fn select_producer(seed: Hash, active: &[(Address, u128)]) -> Option<Address> {
    let total: u128 = active.iter().map(|(_, stake)| stake).sum();
    if total == 0 {
        return None;
    }

    let mut draw_bytes = [0u8; 16];
    draw_bytes.copy_from_slice(&seed.as_slice()[..16]);
    let mut draw = u128::from_be_bytes(draw_bytes) % total;

    for (address, stake) in active {
        if draw < *stake {
            return Some(*address);
        }
        draw -= stake;
    }
    None
}

/// Returns the slot open at `now` for a block building on `parent_timestamp`.
pub fn slot_for(now: u64, parent_timestamp: u64, slot_duration_secs: u64) -> u32 {
    if slot_duration_secs == 0 || now <= parent_timestamp {
        return 0;
    }
    let elapsed = (now - parent_timestamp) / slot_duration_secs;
    elapsed.min(u32::MAX as u64) as u32
}

/// Proof-of-stake strategy: seed and producer checks against the parent state.
pub struct ProofOfStake;

impl ProofOfStake {
    /// Validates a proof-of-stake seal.
    ///
    /// `state` must be positioned at the block's parent; the draw uses the
    /// validator set as it stood before this block applied.
    pub fn validate(
        &self,
        params: &ChainParams,
        block: &Block,
        state: &StateMachine,
    ) -> Result<(), ConsensusError> {
        let Seal::Pos {
            slot,
            seed: sealed_seed,
        } = block.header.seal
        else {
            return Err(ConsensusError::WrongSealKind {
                expected: ConsensusKind::ProofOfStake,
            });
        };

        let derived = seed(
            params.chain_id,
            block.header.previous_block,
            block.header.height,
            slot,
        );
        if sealed_seed != derived {
            return Err(ConsensusError::BadSeed(sealed_seed));
        }

        let active = state.active_validators(params.staking.min_stake);
        let expected =
            select_producer(derived, &active).ok_or(ConsensusError::NoActiveValidators)?;
        if block.header.producer != expected {
            return Err(ConsensusError::WrongProducer {
                expected,
                got: block.header.producer,
            });
        }

        Ok(())
    }
}
