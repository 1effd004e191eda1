//! Chain parameters and deterministic genesis derivation.
//!
//! Percentages, thresholds, and period lengths here are configuration with
//! documented defaults, not protocol constants: two chains may legitimately
//! run with different values, and every consumer reads them from
//! [`ChainParams`] rather than hard-coding them.

use crate::core::block::{Block, Header, Seal};
use crate::crypto::key_pair::PrivateKey;
use crate::types::address::Address;
use crate::types::encoding::{Encode, EncodeSink};
use crate::types::hash::Hash;

/// Consensus family identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusKind {
    /// Nakamoto-style proof-of-work with difficulty adjustment.
    ProofOfWork,
    /// Stake-weighted deterministic producer selection.
    ProofOfStake,
}

impl Encode for ConsensusKind {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        let tag: u8 = match self {
            ConsensusKind::ProofOfWork => 0,
            ConsensusKind::ProofOfStake => 1,
        };
        tag.encode(out);
    }
}

/// Proof-of-work parameters.
#[derive(Debug, Clone)]
pub struct PowParams {
    /// Difficulty of the genesis block and the first adjustment window.
    pub initial_difficulty: u64,
    /// Lower clamp for adjusted difficulty.
    pub min_difficulty: u64,
    /// Upper clamp for adjusted difficulty.
    pub max_difficulty: u64,
    /// Target seconds between blocks.
    pub target_block_time_secs: u64,
    /// Number of blocks between difficulty adjustments.
    pub adjustment_window: u64,
    /// Maximum multiplicative change per adjustment (4 means 4x up, 1/4 down).
    pub max_adjustment_factor: u64,
}

impl Encode for PowParams {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.initial_difficulty.encode(out);
        self.min_difficulty.encode(out);
        self.max_difficulty.encode(out);
        self.target_block_time_secs.encode(out);
        self.adjustment_window.encode(out);
        self.max_adjustment_factor.encode(out);
    }
}

/// Staking and validator lifecycle parameters.
#[derive(Debug, Clone)]
pub struct StakingParams {
    /// Minimum bonded stake required to enter the validator set.
    pub min_stake: u128,
    /// Blocks between a stake deposit and validator activation.
    pub activation_delay_blocks: u64,
    /// Blocks between an unstake request and funds becoming claimable.
    pub unbonding_period_blocks: u64,
    /// Blocks per epoch; validator set transitions happen at boundaries.
    pub epoch_blocks: u64,
    /// Seconds per proof-of-stake slot.
    pub slot_duration_secs: u64,
}

impl Encode for StakingParams {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.min_stake.encode(out);
        self.activation_delay_blocks.encode(out);
        self.unbonding_period_blocks.encode(out);
        self.epoch_blocks.encode(out);
        self.slot_duration_secs.encode(out);
    }
}

/// Slashing penalties and thresholds.
#[derive(Debug, Clone)]
pub struct SlashingParams {
    /// Stake burned for proven double-signing, in basis points.
    pub double_sign_slash_bps: u16,
    /// Stake burned for prolonged offline behavior, in basis points.
    pub offline_slash_bps: u16,
    /// Consecutive missed slots before the offline penalty applies.
    pub offline_miss_threshold: u32,
    /// Offense count at which a validator is ejected from the set.
    pub max_offenses: u32,
}

impl Encode for SlashingParams {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.double_sign_slash_bps.encode(out);
        self.offline_slash_bps.encode(out);
        self.offline_miss_threshold.encode(out);
        self.max_offenses.encode(out);
    }
}

/// Fork-choice limits.
#[derive(Debug, Clone)]
pub struct ForkChoiceParams {
    /// Reorganizations deeper than this are refused.
    pub max_reorg_depth: u64,
}

impl Encode for ForkChoiceParams {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.max_reorg_depth.encode(out);
    }
}

/// Mempool limits.
#[derive(Debug, Clone)]
pub struct MempoolParams {
    /// Maximum number of pending transactions held.
    pub capacity: usize,
    /// Recently confirmed transaction ids remembered for replay rejection.
    pub recent_ids: usize,
}

impl Encode for MempoolParams {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.capacity.encode(out);
        self.recent_ids.encode(out);
    }
}

/// A genesis balance allocation.
#[derive(Debug, Clone)]
pub struct GenesisAccount {
    pub address: Address,
    pub balance: u128,
}

impl Encode for GenesisAccount {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.address.encode(out);
        self.balance.encode(out);
    }
}

/// A validator bonded at genesis.
#[derive(Debug, Clone)]
pub struct GenesisValidator {
    pub address: Address,
    pub stake: u128,
}

impl Encode for GenesisValidator {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.address.encode(out);
        self.stake.encode(out);
    }
}

/// Genesis configuration and derivation parameters.
#[derive(Debug, Clone)]
pub struct GenesisSpec {
    /// Balance allocations present at height 0.
    pub accounts: Vec<GenesisAccount>,
    /// Validators active from height 0 (proof-of-stake chains).
    pub validators: Vec<GenesisValidator>,
    /// Deterministic key bytes used only to sign the genesis block.
    pub signer_key_bytes: [u8; 32],
    /// Genesis block timestamp.
    pub timestamp: u64,
}

impl Encode for GenesisSpec {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.accounts.encode(out);
        self.validators.encode(out);
        self.signer_key_bytes.encode(out);
        self.timestamp.encode(out);
    }
}

/// Chain-wide configuration consumed by every engine component.
#[derive(Debug, Clone)]
pub struct ChainParams {
    /// Chain identifier used for signature and hash domain separation.
    pub chain_id: u64,
    /// Consensus family for this chain.
    pub consensus: ConsensusKind,
    /// Address credited with block fees.
    pub fee_sink: Address,
    pub pow: PowParams,
    pub staking: StakingParams,
    pub slashing: SlashingParams,
    pub fork_choice: ForkChoiceParams,
    pub mempool: MempoolParams,
    pub genesis: GenesisSpec,
}

impl ChainParams {
    /// Deterministic development parameters for a proof-of-work chain.
    ///
    /// Difficulty 1 makes every header hash pass the target, keeping block
    /// production instant in tests.
    pub fn dev_pow(accounts: Vec<GenesisAccount>) -> Self {
        Self {
            chain_id: 0,
            consensus: ConsensusKind::ProofOfWork,
            fee_sink: Address([0xFEu8; 20]),
            pow: PowParams {
                initial_difficulty: 1,
                min_difficulty: 1,
                max_difficulty: u64::MAX / 2,
                target_block_time_secs: 60,
                adjustment_window: 10,
                max_adjustment_factor: 4,
            },
            staking: Self::dev_staking(),
            slashing: Self::dev_slashing(),
            fork_choice: ForkChoiceParams { max_reorg_depth: 64 },
            mempool: MempoolParams {
                capacity: 10_000,
                recent_ids: 10_000,
            },
            genesis: GenesisSpec {
                accounts,
                validators: vec![],
                signer_key_bytes: Self::DEV_GENESIS_SIGNER,
                timestamp: 0,
            },
        }
    }

    /// Deterministic development parameters for a proof-of-stake chain.
    pub fn dev_pos(accounts: Vec<GenesisAccount>, validators: Vec<GenesisValidator>) -> Self {
        let mut params = Self::dev_pow(accounts);
        params.consensus = ConsensusKind::ProofOfStake;
        params.genesis.validators = validators;
        params
    }

    const DEV_GENESIS_SIGNER: [u8; 32] = [
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
        0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e,
        0x1f, 0x20,
    ];

    fn dev_staking() -> StakingParams {
        StakingParams {
            min_stake: 1_000,
            activation_delay_blocks: 4,
            unbonding_period_blocks: 16,
            epoch_blocks: 4,
            slot_duration_secs: 6,
        }
    }

    fn dev_slashing() -> SlashingParams {
        SlashingParams {
            double_sign_slash_bps: 1_000,
            offline_slash_bps: 100,
            offline_miss_threshold: 3,
            max_offenses: 2,
        }
    }

    /// Builds the deterministic genesis block for these parameters.
    ///
    /// Every node with the same parameters derives a byte-identical genesis,
    /// the unique parentless root of the chain forest.
    pub fn build_genesis_block(&self) -> Block {
        let signer = PrivateKey::from_bytes(&self.genesis.signer_key_bytes)
            .expect("genesis signer key bytes must be a valid secp256k1 scalar");

        let seal = match self.consensus {
            ConsensusKind::ProofOfWork => Seal::Pow {
                nonce: 0,
                difficulty: self.pow.initial_difficulty,
            },
            ConsensusKind::ProofOfStake => Seal::Pos {
                slot: 0,
                seed: Hash::zero(),
            },
        };

        let header = Header {
            height: 0,
            timestamp: self.genesis.timestamp,
            previous_block: Hash::zero(),
            merkle_root: Hash::zero(),
            producer: signer.address(),
            seal,
        };

        Block::new(header, &signer, vec![], self.chain_id)
    }

    /// Computes a domain-separated hash of the chain parameters.
    pub fn hash(&self) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"CHAIN_PARAMS");
        self.chain_id.encode(&mut h);
        self.consensus.encode(&mut h);
        self.fee_sink.encode(&mut h);
        self.pow.encode(&mut h);
        self.staking.encode(&mut h);
        self.slashing.encode(&mut h);
        self.fork_choice.encode(&mut h);
        self.mempool.encode(&mut h);
        self.genesis.encode(&mut h);
        h.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_block_is_deterministic() {
        let params = ChainParams::dev_pow(vec![]);
        let g1 = params.build_genesis_block();
        let g2 = params.build_genesis_block();

        assert_eq!(
            g1.header_hash(params.chain_id),
            g2.header_hash(params.chain_id)
        );
        assert_eq!(g1.header.height, 0);
        assert_eq!(g1.header.previous_block, Hash::zero());
        assert!(g1.verify(params.chain_id).is_ok());
    }

    #[test]
    fn pos_genesis_carries_pos_seal() {
        let params = ChainParams::dev_pos(vec![], vec![]);
        let genesis = params.build_genesis_block();
        assert!(matches!(genesis.header.seal, Seal::Pos { slot: 0, .. }));
    }

    #[test]
    fn params_hash_tracks_contents() {
        let p1 = ChainParams::dev_pow(vec![]);
        let mut p2 = ChainParams::dev_pow(vec![]);
        assert_eq!(p1.hash(), p2.hash());

        p2.chain_id = 9;
        assert_ne!(p1.hash(), p2.hash());
    }
}
