//! Pluggable consensus: proof-of-work and proof-of-stake.
//!
//! The chain store talks to a [`ConsensusStrategy`] and never inspects seals
//! itself. Both strategies validate a block against its parent header plus
//! whatever context they need: the proof-of-work side needs the timestamp
//! window for difficulty retargeting, the proof-of-stake side needs the
//! validator set from the state at the parent.

pub mod difficulty;
pub mod pos;
pub mod pow;
pub mod slashing;
pub mod validators;

use crate::core::block::{Block, Header, Seal};
use crate::core::params::{ChainParams, ConsensusKind};
use crate::core::transaction::Transaction;
use crate::crypto::key_pair::PrivateKey;
use crate::state::StateMachine;
use crate::types::address::Address;
use crate::types::hash::Hash;
use std::sync::atomic::AtomicBool;
use thiserror::Error;

/// Reasons a block's consensus proof is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("seal does not match the chain's consensus kind {expected:?}")]
    WrongSealKind { expected: ConsensusKind },
    #[error("difficulty mismatch: expected {expected}, sealed {got}")]
    WrongDifficulty { expected: u64, got: u64 },
    #[error("header hash {0} does not meet the difficulty target")]
    TargetNotMet(Hash),
    #[error("seal seed {0} does not match the derived slot seed")]
    BadSeed(Hash),
    #[error("no active validators to draw a producer from")]
    NoActiveValidators,
    #[error("wrong producer for slot: expected {expected}, sealed {got}")]
    WrongProducer { expected: Address, got: Address },
}

/// Consensus validation dispatch for one chain.
pub enum ConsensusStrategy {
    Pow(pow::ProofOfWork),
    Pos(pos::ProofOfStake),
}

impl ConsensusStrategy {
    /// Builds the strategy configured by `params.consensus`.
    pub fn for_params(params: &ChainParams) -> Self {
        match params.consensus {
            ConsensusKind::ProofOfWork => ConsensusStrategy::Pow(pow::ProofOfWork::new(&params.pow)),
            ConsensusKind::ProofOfStake => ConsensusStrategy::Pos(pos::ProofOfStake),
        }
    }

    /// Assembles an unsealed candidate header extending `parent`.
    ///
    /// For proof-of-work the seal carries the expected difficulty and a zero
    /// nonce for [`ConsensusStrategy::finalize`] to search. For
    /// proof-of-stake the slot and seed are derived from `timestamp`, and an
    /// error tells the caller this is not its slot.
    #[allow(clippy::too_many_arguments)]
    pub fn candidate_header(
        &self,
        params: &ChainParams,
        parent: &Header,
        parent_hash: Hash,
        producer: Address,
        merkle_root: Hash,
        timestamp: u64,
        window_timestamps: &[u64],
        state: &StateMachine,
    ) -> Result<Header, ConsensusError> {
        let height = parent.height + 1;
        let seal = match self {
            ConsensusStrategy::Pow(_) => {
                let parent_difficulty = parent
                    .seal
                    .difficulty()
                    .unwrap_or(params.pow.initial_difficulty);
                let difficulty = difficulty::DifficultyAdjuster::new(&params.pow).expected_for(
                    height,
                    parent_difficulty,
                    window_timestamps,
                );
                Seal::Pow {
                    nonce: 0,
                    difficulty,
                }
            }
            ConsensusStrategy::Pos(_) => {
                let slot = pos::slot_for(timestamp, parent.timestamp, params.staking.slot_duration_secs);
                let seed = pos::seed(params.chain_id, parent_hash, height, slot);
                let active = state.active_validators(params.staking.min_stake);
                let expected =
                    pos::select_producer(seed, &active).ok_or(ConsensusError::NoActiveValidators)?;
                if expected != producer {
                    return Err(ConsensusError::WrongProducer {
                        expected,
                        got: producer,
                    });
                }
                Seal::Pos { slot, seed }
            }
        };

        Ok(Header {
            height,
            timestamp,
            previous_block: parent_hash,
            merkle_root,
            producer,
            seal,
        })
    }

    /// Completes the consensus proof and signs the block.
    ///
    /// Proof-of-work searches the nonce space until `cancel` is raised;
    /// proof-of-stake needs only the producer's signature.
    pub fn finalize(
        &self,
        header: Header,
        transactions: Vec<Transaction>,
        producer: &PrivateKey,
        chain_id: u64,
        cancel: &AtomicBool,
    ) -> Option<Block> {
        match self {
            ConsensusStrategy::Pow(_) => pow::mine(header, transactions, producer, chain_id, cancel),
            ConsensusStrategy::Pos(_) => Some(Block::new(header, producer, transactions, chain_id)),
        }
    }

    /// Validates a block's seal against its parent and branch context.
    ///
    /// `window_timestamps` holds the timestamps of the most recent blocks on
    /// the branch ending at the parent, oldest first; `state` is the state
    /// machine positioned at the parent.
    pub fn validate(
        &self,
        params: &ChainParams,
        block: &Block,
        parent: &Header,
        window_timestamps: &[u64],
        state: &StateMachine,
    ) -> Result<(), ConsensusError> {
        match self {
            ConsensusStrategy::Pow(strategy) => {
                strategy.validate(params, block, parent, window_timestamps)
            }
            ConsensusStrategy::Pos(strategy) => strategy.validate(params, block, state),
        }
    }
}
