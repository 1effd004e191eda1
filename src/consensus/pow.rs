//! Proof-of-work sealing and validation.
//!
//! A header is sealed when its chain-specific hash, interpreted as a
//! big-endian 256-bit integer, falls below `floor(2^256 / difficulty)`.
//! Mining strides the nonce space across all available cores and stops as
//! soon as one thread finds a solution or the caller cancels.

use crate::consensus::ConsensusError;
use crate::consensus::difficulty::DifficultyAdjuster;
use crate::core::block::{Block, Header, Seal};
use crate::core::params::{ChainParams, ConsensusKind, PowParams};
use crate::core::transaction::Transaction;
use crate::crypto::key_pair::PrivateKey;
use crate::types::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

/// Computes the 256-bit target for `difficulty` as `floor(2^256 / d)`.
///
/// Difficulty 0 and 1 both saturate to the all-ones target, which every
/// hash satisfies.
pub fn difficulty_target(difficulty: u64) -> [u8; 32] {
    if difficulty <= 1 {
        return [0xFF; 32];
    }

    // Byte-wise long division of 2^256 (a one followed by 32 zero bytes)
    // by the difficulty. Each remainder is below the u64 divisor, so the
    // accumulator stays below 2^72 and fits in a u128.
    let divisor = difficulty as u128;
    let mut quotient = [0u8; 33];
    let mut remainder: u128 = 0;
    for (i, byte) in std::iter::once(1u8).chain(std::iter::repeat(0).take(32)).enumerate() {
        let acc = (remainder << 8) | byte as u128;
        quotient[i] = (acc / divisor) as u8;
        remainder = acc % divisor;
    }

    // 2^256 / d < 2^256 for d > 1, so the leading quotient byte is zero.
    let mut target = [0u8; 32];
    target.copy_from_slice(&quotient[1..]);
    target
}

/// True when `hash`, read as a big-endian integer, is below `target`.
pub fn meets_target(hash: &Hash, target: &[u8; 32]) -> bool {
    hash.as_slice() < &target[..]
}

/// Proof-of-work strategy: difficulty schedule plus target check.
pub struct ProofOfWork {
    adjuster: DifficultyAdjuster,
}

impl ProofOfWork {
    pub fn new(params: &PowParams) -> Self {
        Self {
            adjuster: DifficultyAdjuster::new(params),
        }
    }

    /// Validates a proof-of-work seal against the parent and the timestamp
    /// window used for retargeting.
    pub fn validate(
        &self,
        params: &ChainParams,
        block: &Block,
        parent: &Header,
        window_timestamps: &[u64],
    ) -> Result<(), ConsensusError> {
        let Seal::Pow { difficulty, .. } = block.header.seal else {
            return Err(ConsensusError::WrongSealKind {
                expected: ConsensusKind::ProofOfWork,
            });
        };

        let parent_difficulty = parent
            .seal
            .difficulty()
            .unwrap_or(params.pow.initial_difficulty);
        let expected =
            self.adjuster
                .expected_for(block.header.height, parent_difficulty, window_timestamps);
        if difficulty != expected {
            return Err(ConsensusError::WrongDifficulty {
                expected,
                got: difficulty,
            });
        }

        let hash = block.header_hash(params.chain_id);
        if !meets_target(&hash, &difficulty_target(difficulty)) {
            return Err(ConsensusError::TargetNotMet(hash));
        }

        Ok(())
    }
}

/// Searches the nonce space until the header hash meets the target.
///
/// The nonce space is strided across all available cores. Returns `None`
/// when `cancel` is raised before a solution is found, or when the header
/// does not carry a proof-of-work seal.
pub fn mine(
    header: Header,
    transactions: Vec<Transaction>,
    producer: &PrivateKey,
    chain_id: u64,
    cancel: &AtomicBool,
) -> Option<Block> {
    let Seal::Pow { difficulty, .. } = header.seal else {
        return None;
    };
    let target = difficulty_target(difficulty);

    let threads = thread::available_parallelism().map_or(1, usize::from) as u64;
    let solved = AtomicBool::new(false);
    let winning_nonce = AtomicU64::new(0);

    thread::scope(|scope| {
        for offset in 0..threads {
            let mut candidate = header.clone();
            let (solved, winning_nonce, target) = (&solved, &winning_nonce, &target);
            scope.spawn(move || {
                let mut nonce = offset;
                loop {
                    if cancel.load(Ordering::Relaxed) || solved.load(Ordering::Relaxed) {
                        return;
                    }
                    candidate.seal = Seal::Pow { nonce, difficulty };
                    if meets_target(&candidate.hash(chain_id), target) {
                        winning_nonce.store(nonce, Ordering::SeqCst);
                        solved.store(true, Ordering::SeqCst);
                        return;
                    }
                    nonce = nonce.wrapping_add(threads);
                }
            });
        }
    });

    if !solved.load(Ordering::SeqCst) {
        return None;
    }

    let mut header = header;
    header.seal = Seal::Pow {
        nonce: winning_nonce.load(Ordering::SeqCst),
        difficulty,
    };
    Some(Block::new(header, producer, transactions, chain_id))
}
