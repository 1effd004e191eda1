//! Fork-aware block store with heaviest-chain selection.
//!
//! Every structurally valid block with a known parent is kept, canonical or
//! not, so the store holds a forest rooted at genesis. Each stored block
//! carries the state delta its application produced; switching branches is
//! rollback along the old branch and replay along the new one, never
//! re-execution. A single write lock serializes submissions, so state,
//! canonical index, and persistence always agree.

use crate::consensus::slashing::{DoubleSignEvidence, SlashingEvidenceError};
use crate::consensus::{ConsensusError, ConsensusStrategy};
use crate::consensus::validators::ValidatorRecord;
use crate::core::ValidationError;
use crate::core::account::Account;
use crate::core::block::{Block, Seal};
use crate::core::params::ChainParams;
use crate::core::transaction::Transaction;
use crate::mempool::{Mempool, MempoolError};
use crate::state::{StateDelta, StateMachine};
use crate::storage::{KvStore, StorageError};
use crate::types::address::Address;
use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use crate::{info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Seconds a block timestamp may run ahead of local wall-clock time.
pub const MAX_BLOCK_TIME_DRIFT_SECS: u64 = 15;

/// Outcome of a successful block submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The block extended the canonical tip.
    Extended,
    /// The block was stored on a non-canonical branch.
    SideBranch,
    /// The block made its branch the heaviest; `depth` canonical blocks
    /// were abandoned.
    Reorged { depth: u64 },
    /// The block's branch is heaviest but switching would abandon more
    /// than the configured depth; it was stored without switching.
    ReorgRefused { depth: u64 },
}

/// Details of a completed reorganization, passed to registered hooks.
#[derive(Debug, Clone)]
pub struct ReorgInfo {
    /// Canonical blocks abandoned, previous tip first.
    pub abandoned: Vec<Hash>,
    /// Blocks adopted above the fork point, oldest first.
    pub adopted: Vec<Hash>,
    /// Number of abandoned canonical blocks.
    pub depth: u64,
    pub new_tip: Hash,
}

/// Reasons a submission is rejected outright.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("block {0} is already stored")]
    Duplicate(Hash),
    #[error("parent {0} is unknown")]
    UnknownParent(Hash),
    #[error("no validator record for {0}")]
    UnknownValidator(Address),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    #[error(transparent)]
    Mempool(#[from] MempoolError),
    #[error(transparent)]
    Evidence(#[from] SlashingEvidenceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

struct StoredBlock {
    block: Arc<Block>,
    parent: Hash,
    height: u64,
    /// Cumulative branch weight up to and including this block.
    weight: u128,
    /// State mutations this block's application produced.
    delta: StateDelta,
}

struct ChainInner {
    blocks: HashMap<Hash, StoredBlock>,
    /// Canonical hash per height; `canonical[h]` is the block at height `h`.
    canonical: Vec<Hash>,
    tip: Hash,
    /// State at the canonical tip.
    state: StateMachine,
}

/// Chain store: block forest, canonical state, mempool, and persistence.
pub struct ChainStore<K: KvStore> {
    params: ChainParams,
    consensus: ConsensusStrategy,
    kv: K,
    mempool: Mempool,
    inner: RwLock<ChainInner>,
    on_reorg: Mutex<Vec<Box<dyn Fn(&ReorgInfo) + Send + Sync>>>,
}

fn block_key(hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(6 + 32);
    key.extend_from_slice(b"block:");
    key.extend_from_slice(hash.as_slice());
    key
}

/// Weight a block adds to its branch, taken against the parent state.
///
/// Proof-of-work blocks weigh their difficulty. Proof-of-stake blocks weigh
/// the sealing producer's stake as it stood before the block applied, so an
/// equally long branch of lightly staked producers cannot outweigh one built
/// by heavily staked producers.
fn weight_contribution(block: &Block, state: &StateMachine) -> u128 {
    match block.header.seal {
        Seal::Pow { difficulty, .. } => difficulty.max(1) as u128,
        Seal::Pos { .. } => state
            .validator(&block.header.producer)
            .map_or(0, |v| v.stake)
            .max(1),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Lowest common ancestor of two stored blocks.
fn lca(blocks: &HashMap<Hash, StoredBlock>, mut a: Hash, mut b: Hash) -> Hash {
    let mut height_a = blocks[&a].height;
    let mut height_b = blocks[&b].height;
    while height_a > height_b {
        a = blocks[&a].parent;
        height_a -= 1;
    }
    while height_b > height_a {
        b = blocks[&b].parent;
        height_b -= 1;
    }
    while a != b {
        a = blocks[&a].parent;
        b = blocks[&b].parent;
    }
    a
}

/// Hashes from just above `ancestor` down to `descendant`, oldest first.
fn path_from(blocks: &HashMap<Hash, StoredBlock>, ancestor: Hash, descendant: Hash) -> Vec<Hash> {
    let mut path = Vec::new();
    let mut cursor = descendant;
    while cursor != ancestor {
        path.push(cursor);
        cursor = blocks[&cursor].parent;
    }
    path.reverse();
    path
}

/// Moves `state` from the block at `from` to the block at `to` by rolling
/// back to their common ancestor and replaying stored deltas upward.
fn rebase(blocks: &HashMap<Hash, StoredBlock>, state: &mut StateMachine, from: Hash, to: Hash) {
    if from == to {
        return;
    }
    let fork = lca(blocks, from, to);
    let mut cursor = from;
    while cursor != fork {
        let stored = &blocks[&cursor];
        state.rollback(&stored.delta);
        cursor = stored.parent;
    }
    for hash in path_from(blocks, fork, to) {
        state.replay(&blocks[&hash].delta);
    }
}

/// Timestamps of up to `max` blocks on the branch ending at `from`,
/// oldest first. Feeds difficulty retargeting.
fn timestamp_window(blocks: &HashMap<Hash, StoredBlock>, from: Hash, max: usize) -> Vec<u64> {
    let mut timestamps = Vec::new();
    let mut cursor = from;
    loop {
        let stored = &blocks[&cursor];
        timestamps.push(stored.block.header.timestamp);
        if timestamps.len() >= max || stored.height == 0 {
            break;
        }
        cursor = stored.parent;
    }
    timestamps.reverse();
    timestamps
}

impl<K: KvStore> ChainStore<K> {
    /// Creates a store seeded with the deterministic genesis block.
    pub fn new(params: ChainParams, kv: K) -> Result<Self, ChainError> {
        let genesis = params.build_genesis_block();
        genesis.verify(params.chain_id)?;
        let genesis_hash = genesis.header_hash(params.chain_id);

        kv.put(&block_key(&genesis_hash), &genesis.to_bytes())?;

        let state = StateMachine::from_genesis(&params);
        let genesis_weight = weight_contribution(&genesis, &state);
        let mut blocks = HashMap::new();
        blocks.insert(
            genesis_hash,
            StoredBlock {
                weight: genesis_weight,
                block: Arc::new(genesis),
                parent: Hash::zero(),
                height: 0,
                delta: StateDelta::default(),
            },
        );

        let mempool = Mempool::new(
            params.chain_id,
            params.mempool.capacity,
            params.mempool.recent_ids,
        );
        let consensus = ConsensusStrategy::for_params(&params);

        Ok(Self {
            params,
            consensus,
            kv,
            mempool,
            inner: RwLock::new(ChainInner {
                blocks,
                canonical: vec![genesis_hash],
                tip: genesis_hash,
                state,
            }),
            on_reorg: Mutex::new(Vec::new()),
        })
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// Returns the canonical tip hash and height.
    pub fn tip(&self) -> (Hash, u64) {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        (inner.tip, inner.blocks[&inner.tip].height)
    }

    /// Returns a stored block by hash, canonical or not.
    pub fn get_block(&self, hash: &Hash) -> Option<Arc<Block>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.blocks.get(hash).map(|stored| stored.block.clone())
    }

    /// Returns the canonical block at `height`.
    pub fn canonical_block_at(&self, height: u64) -> Option<Arc<Block>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let hash = inner.canonical.get(height as usize)?;
        inner.blocks.get(hash).map(|stored| stored.block.clone())
    }

    /// Returns the account at the canonical tip.
    pub fn account(&self, address: &Address) -> Option<Account> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.state.account(address).cloned()
    }

    /// Returns the validator record at the canonical tip.
    pub fn validator(&self, address: &Address) -> Option<ValidatorRecord> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.state.validator(address).cloned()
    }

    /// Registers a hook invoked after every completed reorganization.
    pub fn on_reorg(&self, hook: impl Fn(&ReorgInfo) + Send + Sync + 'static) {
        let mut hooks = self.on_reorg.lock().unwrap_or_else(|e| e.into_inner());
        hooks.push(Box::new(hook));
    }

    /// Admits a transaction into the mempool against canonical tip state.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<(), ChainError> {
        let account = {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            inner.state.account(&tx.sender()).cloned()
        };
        self.mempool.admit(tx, account.as_ref())?;
        Ok(())
    }

    /// Applies a verified double-sign penalty at the canonical tip.
    ///
    /// The penalty's delta is merged into the tip block's delta, so a reorg
    /// that abandons the tip rolls the penalty back with it.
    ///
    /// Returns the amount of stake burned.
    pub fn submit_evidence(&self, evidence: &DoubleSignEvidence) -> Result<u128, ChainError> {
        evidence.verify(self.params.chain_id)?;

        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let inner = &mut *guard;
        let tip = inner.tip;
        let tip_height = inner.blocks[&tip].height;
        let offender = evidence.producer_key.address;

        let mut delta = StateDelta::default();
        let burned = inner
            .state
            .apply_double_sign_penalty(&mut delta, offender, tip_height, &self.params)
            .ok_or(ChainError::UnknownValidator(offender))?;

        if let Some(stored) = inner.blocks.get_mut(&tip) {
            stored.delta.merge(delta);
        }
        warn!(
            "slashed validator {} by {} for double-signing at height {}",
            offender, burned, evidence.height
        );
        Ok(burned)
    }

    /// Submits a block and resolves fork choice.
    ///
    /// The block must chain to a stored parent. Structural, consensus, and
    /// stateful checks all pass before anything is persisted; a rejected
    /// block leaves the store untouched.
    pub fn submit_block(&self, block: Block) -> Result<Outcome, ChainError> {
        let chain_id = self.params.chain_id;
        let hash = block.header_hash(chain_id);

        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let inner = &mut *guard;

        if inner.blocks.contains_key(&hash) {
            return Err(ChainError::Duplicate(hash));
        }
        let parent_hash = block.header.previous_block;
        let parent = inner
            .blocks
            .get(&parent_hash)
            .ok_or(ChainError::UnknownParent(parent_hash))?;
        let parent_height = parent.height;
        let parent_weight = parent.weight;
        let parent_header = parent.block.header.clone();

        if block.header.height != parent_height + 1 {
            return Err(ValidationError::WrongHeight {
                block: hash,
                parent: parent_height,
                got: block.header.height,
            }
            .into());
        }
        let min_timestamp = parent_header.timestamp + 1;
        let max_timestamp = unix_now().saturating_add(MAX_BLOCK_TIME_DRIFT_SECS);
        if block.header.timestamp < min_timestamp || block.header.timestamp > max_timestamp {
            return Err(ValidationError::TimestampOutOfBounds {
                block: hash,
                got: block.header.timestamp,
                min: min_timestamp,
                max: max_timestamp,
            }
            .into());
        }
        block.verify(chain_id)?;

        // Position the state at the parent for consensus and application.
        let old_tip = inner.tip;
        rebase(&inner.blocks, &mut inner.state, old_tip, parent_hash);
        let contribution = weight_contribution(&block, &inner.state);

        let window = timestamp_window(
            &inner.blocks,
            parent_hash,
            self.params.pow.adjustment_window as usize,
        );
        let applied = match self.consensus.validate(
            &self.params,
            &block,
            &parent_header,
            &window,
            &inner.state,
        ) {
            Ok(()) => inner
                .state
                .apply_block(&block, &self.params)
                .map_err(ChainError::from),
            Err(err) => Err(err.into()),
        };
        let applied = match applied {
            Ok(delta) => match self.kv.put(&block_key(&hash), &block.to_bytes()) {
                Ok(()) => Ok(delta),
                Err(err) => {
                    inner.state.rollback(&delta);
                    Err(err.into())
                }
            },
            Err(err) => Err(err),
        };
        let delta = match applied {
            Ok(delta) => delta,
            Err(err) => {
                rebase(&inner.blocks, &mut inner.state, parent_hash, old_tip);
                return Err(err);
            }
        };

        let height = parent_height + 1;
        let weight = parent_weight + contribution;
        let block = Arc::new(block);
        inner.blocks.insert(
            hash,
            StoredBlock {
                block: block.clone(),
                parent: parent_hash,
                height,
                weight,
                delta,
            },
        );

        if parent_hash == old_tip {
            inner.canonical.push(hash);
            inner.tip = hash;
            self.mempool.mark_confirmed(&block.transactions);
            info!("chain extended to height {height} by block {hash}");
            return Ok(Outcome::Extended);
        }

        let tip_weight = inner.blocks[&old_tip].weight;
        let adopts = weight > tip_weight || (weight == tip_weight && hash < old_tip);
        if !adopts {
            rebase(&inner.blocks, &mut inner.state, hash, old_tip);
            info!("stored side-branch block {hash} at height {height}");
            return Ok(Outcome::SideBranch);
        }

        let fork = lca(&inner.blocks, old_tip, hash);
        let fork_height = inner.blocks[&fork].height;
        let depth = inner.blocks[&old_tip].height - fork_height;
        if depth > self.params.fork_choice.max_reorg_depth {
            rebase(&inner.blocks, &mut inner.state, hash, old_tip);
            warn!(
                "refused reorg of depth {depth} to block {hash}, limit is {}",
                self.params.fork_choice.max_reorg_depth
            );
            return Ok(Outcome::ReorgRefused { depth });
        }

        let abandoned: Vec<Hash> = inner.canonical[fork_height as usize + 1..]
            .iter()
            .rev()
            .copied()
            .collect();
        let adopted = path_from(&inner.blocks, fork, hash);
        inner.canonical.truncate(fork_height as usize + 1);
        inner.canonical.extend(adopted.iter().copied());
        inner.tip = hash;

        // Reconcile the mempool: everything the new branch confirmed leaves
        // the pool; abandoned transactions it did not confirm return.
        let mut confirmed_ids = HashSet::new();
        for adopted_hash in &adopted {
            let transactions = inner.blocks[adopted_hash].block.transactions.clone();
            for tx in transactions.iter() {
                confirmed_ids.insert(tx.id(chain_id));
            }
            self.mempool.mark_confirmed(&transactions);
        }
        for abandoned_hash in abandoned.iter().rev() {
            let transactions = inner.blocks[abandoned_hash].block.transactions.clone();
            for tx in transactions.iter() {
                if confirmed_ids.contains(&tx.id(chain_id)) {
                    continue;
                }
                let account = inner.state.account(&tx.sender()).cloned();
                // Readmission can fail against the new branch's nonces.
                let _ = self.mempool.readmit(tx.clone(), account.as_ref());
            }
        }

        let reorg = ReorgInfo {
            abandoned,
            adopted,
            depth,
            new_tip: hash,
        };
        drop(guard);

        warn!("reorganized {depth} block(s); new tip {hash} at height {height}");
        let hooks = self.on_reorg.lock().unwrap_or_else(|e| e.into_inner());
        for hook in hooks.iter() {
            hook(&reorg);
        }
        Ok(Outcome::Reorged { depth })
    }
}
