//! Fee-prioritized transaction pool.
//!
//! Admission enforces signature validity, per-sender nonce contiguity, and
//! that the sender's balance covers everything it already has queued. A
//! bounded set of recently confirmed ids rejects replays of transactions
//! that just left in a block. When the pool is full a new transaction must
//! outrank the worst queued one, which it then evicts.
//!
//! Transaction bodies live in a concurrent map keyed by id; a single mutex
//! guards the priority order and the per-sender queues so admission,
//! selection, and confirmation stay mutually consistent.

use crate::core::account::Account;
use crate::core::transaction::Transaction;
use crate::types::address::Address;
use crate::types::hash::Hash;
use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use thiserror::Error;

/// Reasons a transaction is refused admission.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MempoolError {
    #[error("invalid signature on transaction {0}")]
    InvalidSignature(Hash),
    #[error("transaction {0} was recently confirmed")]
    RecentlyConfirmed(Hash),
    #[error("nonce gap for {address}: expected {expected}, got {got}")]
    NonceGap {
        address: Address,
        expected: u64,
        got: u64,
    },
    #[error("{address} cannot cover {required} with {available} after queued spend")]
    InsufficientFunds {
        address: Address,
        required: u128,
        available: u128,
    },
    #[error("pool is full and fee {got} does not beat the lowest queued fee {lowest}")]
    FeeTooLow { got: u128, lowest: u128 },
}

/// Priority key: highest fee first, then sender, nonce, and id ascending.
///
/// The sender/nonce/id tail makes the order total, so two nodes holding the
/// same transactions select them identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OrderKey {
    fee: u128,
    sender: Address,
    nonce: u64,
    id: Hash,
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fee
            .cmp(&self.fee)
            .then_with(|| self.sender.cmp(&other.sender))
            .then_with(|| self.nonce.cmp(&other.nonce))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy)]
struct QueuedTx {
    id: Hash,
    fee: u128,
    cost: u128,
}

#[derive(Default)]
struct SenderQueue {
    /// Queued transactions by nonce; contiguous from the account nonce.
    txs: BTreeMap<u64, QueuedTx>,
    /// Total cost of everything queued for this sender.
    spend: u128,
}

#[derive(Default)]
struct MempoolIndex {
    order: BTreeSet<OrderKey>,
    senders: HashMap<Address, SenderQueue>,
}

impl MempoolIndex {
    fn insert(&mut self, sender: Address, nonce: u64, queued: QueuedTx) {
        self.order.insert(OrderKey {
            fee: queued.fee,
            sender,
            nonce,
            id: queued.id,
        });
        let queue = self.senders.entry(sender).or_default();
        queue.spend = queue.spend.saturating_add(queued.cost);
        queue.txs.insert(nonce, queued);
    }

    fn remove(&mut self, sender: Address, nonce: u64) -> Option<QueuedTx> {
        let queue = self.senders.get_mut(&sender)?;
        let queued = queue.txs.remove(&nonce)?;
        queue.spend = queue.spend.saturating_sub(queued.cost);
        if queue.txs.is_empty() {
            self.senders.remove(&sender);
        }
        self.order.remove(&OrderKey {
            fee: queued.fee,
            sender,
            nonce,
            id: queued.id,
        });
        Some(queued)
    }
}

struct RecentIds {
    capacity: usize,
    set: HashSet<Hash>,
    queue: VecDeque<Hash>,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            set: HashSet::new(),
            queue: VecDeque::new(),
        }
    }

    fn insert(&mut self, id: Hash) {
        if self.capacity == 0 || !self.set.insert(id) {
            return;
        }
        self.queue.push_back(id);
        while self.queue.len() > self.capacity {
            if let Some(evicted) = self.queue.pop_front() {
                self.set.remove(&evicted);
            }
        }
    }

    fn contains(&self, id: &Hash) -> bool {
        self.set.contains(id)
    }

    fn forget(&mut self, id: &Hash) {
        if self.set.remove(id) {
            self.queue.retain(|queued| queued != id);
        }
    }
}

/// Pending transaction pool shared between block production and submission.
pub struct Mempool {
    chain_id: u64,
    capacity: usize,
    txs: DashMap<Hash, Transaction>,
    index: Mutex<MempoolIndex>,
    recent: Mutex<RecentIds>,
}

impl Mempool {
    /// Creates an empty pool bound to one chain.
    pub fn new(chain_id: u64, capacity: usize, recent_ids: usize) -> Self {
        Self {
            chain_id,
            capacity,
            txs: DashMap::new(),
            index: Mutex::new(MempoolIndex::default()),
            recent: Mutex::new(RecentIds::new(recent_ids)),
        }
    }

    /// Number of transactions currently queued.
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// True when `id` is currently queued.
    pub fn contains(&self, id: &Hash) -> bool {
        self.txs.contains_key(id)
    }

    /// Admits a transaction against the sender's confirmed account state.
    ///
    /// `account` is the sender's account on the canonical branch, absent for
    /// fresh addresses. Re-admitting an already queued transaction is a
    /// no-op.
    pub fn admit(&self, tx: Transaction, account: Option<&Account>) -> Result<(), MempoolError> {
        let id = tx.id(self.chain_id);

        if self.txs.contains_key(&id) {
            return Ok(());
        }
        {
            let recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
            if recent.contains(&id) {
                return Err(MempoolError::RecentlyConfirmed(id));
            }
        }
        if !tx.verify(self.chain_id) {
            return Err(MempoolError::InvalidSignature(id));
        }

        let sender = tx.sender();
        let base_nonce = account.map_or(0, Account::nonce);
        let available = account.map_or(0, Account::balance);
        let cost = tx.required_balance();

        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());

        let (expected_nonce, queued_spend) = match index.senders.get(&sender) {
            Some(queue) => {
                // A reorg can drop the confirmed nonce below what is queued;
                // the next admissible nonce is the first hole walking up from
                // the lower of the two.
                let mut expected = queue
                    .txs
                    .keys()
                    .next()
                    .map_or(base_nonce, |first| base_nonce.min(*first));
                while queue.txs.contains_key(&expected) {
                    expected += 1;
                }
                (expected, queue.spend)
            }
            None => (base_nonce, 0),
        };
        if tx.nonce != expected_nonce {
            return Err(MempoolError::NonceGap {
                address: sender,
                expected: expected_nonce,
                got: tx.nonce,
            });
        }

        let required = queued_spend.saturating_add(cost);
        if available < required {
            return Err(MempoolError::InsufficientFunds {
                address: sender,
                required,
                available,
            });
        }

        if self.txs.len() >= self.capacity {
            self.evict_for(&mut index, &tx, id)?;
        }

        index.insert(
            sender,
            tx.nonce,
            QueuedTx {
                id,
                fee: tx.fee,
                cost,
            },
        );
        self.txs.insert(id, tx);
        Ok(())
    }

    /// Evicts the worst queued transaction to make room for a better one.
    ///
    /// Evicting a mid-queue nonce would leave the victim's sender with a gap,
    /// so everything that sender queued after the victim goes too.
    fn evict_for(
        &self,
        index: &mut MempoolIndex,
        tx: &Transaction,
        id: Hash,
    ) -> Result<(), MempoolError> {
        let new_key = OrderKey {
            fee: tx.fee,
            sender: tx.sender(),
            nonce: tx.nonce,
            id,
        };
        let worst = match index.order.iter().next_back() {
            Some(worst) => *worst,
            None => return Ok(()),
        };
        if new_key >= worst {
            return Err(MempoolError::FeeTooLow {
                got: tx.fee,
                lowest: worst.fee,
            });
        }

        let mut doomed_nonces = vec![worst.nonce];
        if let Some(queue) = index.senders.get(&worst.sender) {
            doomed_nonces.extend(queue.txs.range(worst.nonce + 1..).map(|(nonce, _)| *nonce));
        }
        for nonce in doomed_nonces {
            if let Some(evicted) = index.remove(worst.sender, nonce) {
                self.txs.remove(&evicted.id);
            }
        }
        Ok(())
    }

    /// Selects up to `max` transactions in priority order.
    ///
    /// A sender's transactions are only released in nonce order, so a
    /// high-fee later nonce waits behind its cheaper predecessors.
    pub fn select(&self, max: usize) -> Vec<Transaction> {
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner());

        let mut next_nonce: HashMap<Address, u64> = index
            .senders
            .iter()
            .filter_map(|(sender, queue)| {
                queue.txs.keys().next().map(|nonce| (*sender, *nonce))
            })
            .collect();

        let mut selected = Vec::new();
        let mut deferred: Vec<OrderKey> = Vec::new();

        for key in &index.order {
            if selected.len() >= max {
                break;
            }
            if next_nonce.get(&key.sender) == Some(&key.nonce) {
                if let Some(tx) = self.txs.get(&key.id) {
                    selected.push(tx.clone());
                }
                *next_nonce.get_mut(&key.sender).unwrap() += 1;

                // A released nonce may unblock stashed successors.
                let mut unblocked = true;
                while unblocked && selected.len() < max {
                    unblocked = false;
                    for i in 0..deferred.len() {
                        let stash = deferred[i];
                        if next_nonce.get(&stash.sender) == Some(&stash.nonce) {
                            if let Some(tx) = self.txs.get(&stash.id) {
                                selected.push(tx.clone());
                            }
                            *next_nonce.get_mut(&stash.sender).unwrap() += 1;
                            deferred.remove(i);
                            unblocked = true;
                            break;
                        }
                    }
                }
            } else {
                deferred.push(*key);
            }
        }
        selected
    }

    /// Drops confirmed transactions and remembers their ids for replay
    /// rejection.
    pub fn mark_confirmed(&self, confirmed: &[Transaction]) {
        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        for tx in confirmed {
            let id = tx.id(self.chain_id);
            // A queued competitor at the same sender and nonce is dead now
            // too; drop its body, not just its index entry.
            if let Some(displaced) = index.remove(tx.sender(), tx.nonce) {
                self.txs.remove(&displaced.id);
            }
            self.txs.remove(&id);
            recent.insert(id);
        }
    }

    /// Returns a transaction abandoned by a reorg to the pool.
    ///
    /// Its id is cleared from the recently-confirmed set first, since the
    /// branch that confirmed it is no longer canonical.
    pub fn readmit(&self, tx: Transaction, account: Option<&Account>) -> Result<(), MempoolError> {
        let id = tx.id(self.chain_id);
        {
            let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
            recent.forget(&id);
        }
        self.admit(tx, account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::TxKind;
    use crate::crypto::key_pair::PrivateKey;
    use crate::utils::test_utils::utils::transfer_tx;

    const TEST_CHAIN_ID: u64 = 3;

    fn rich_account() -> Account {
        Account::new(1_000_000)
    }

    #[test]
    fn admits_and_selects_by_fee() {
        let pool = Mempool::new(TEST_CHAIN_ID, 100, 100);
        let low = PrivateKey::new();
        let high = PrivateKey::new();

        pool.admit(transfer_tx(&low, 0, 10, 1, TEST_CHAIN_ID), Some(&rich_account()))
            .unwrap();
        pool.admit(transfer_tx(&high, 0, 10, 50, TEST_CHAIN_ID), Some(&rich_account()))
            .unwrap();

        let selected = pool.select(10);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].fee, 50);
        assert_eq!(selected[1].fee, 1);
    }

    #[test]
    fn duplicate_admission_is_a_noop() {
        let pool = Mempool::new(TEST_CHAIN_ID, 100, 100);
        let key = PrivateKey::new();
        let tx = transfer_tx(&key, 0, 10, 1, TEST_CHAIN_ID);

        pool.admit(tx.clone(), Some(&rich_account())).unwrap();
        pool.admit(tx, Some(&rich_account())).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn rejects_tampered_signature() {
        let pool = Mempool::new(TEST_CHAIN_ID, 100, 100);
        let key = PrivateKey::new();
        let mut tx = transfer_tx(&key, 0, 10, 1, TEST_CHAIN_ID);
        tx.amount = 999;

        assert!(matches!(
            pool.admit(tx, Some(&rich_account())),
            Err(MempoolError::InvalidSignature(_))
        ));
    }

    #[test]
    fn rejects_nonce_gaps_and_accepts_contiguous_queue() {
        let pool = Mempool::new(TEST_CHAIN_ID, 100, 100);
        let key = PrivateKey::new();

        pool.admit(transfer_tx(&key, 0, 10, 1, TEST_CHAIN_ID), Some(&rich_account()))
            .unwrap();
        // Nonce 2 skips 1.
        assert!(matches!(
            pool.admit(transfer_tx(&key, 2, 10, 1, TEST_CHAIN_ID), Some(&rich_account())),
            Err(MempoolError::NonceGap {
                expected: 1,
                got: 2,
                ..
            })
        ));
        pool.admit(transfer_tx(&key, 1, 10, 1, TEST_CHAIN_ID), Some(&rich_account()))
            .unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn rejects_spend_beyond_balance_including_queued() {
        let pool = Mempool::new(TEST_CHAIN_ID, 100, 100);
        let key = PrivateKey::new();
        let account = Account::new(100);

        pool.admit(transfer_tx(&key, 0, 60, 1, TEST_CHAIN_ID), Some(&account))
            .unwrap();
        // 61 queued; another 60 + 1 would need 122 total.
        assert!(matches!(
            pool.admit(transfer_tx(&key, 1, 60, 1, TEST_CHAIN_ID), Some(&account)),
            Err(MempoolError::InsufficientFunds { required: 122, .. })
        ));
    }

    #[test]
    fn unstake_admission_reserves_only_the_fee() {
        let pool = Mempool::new(TEST_CHAIN_ID, 100, 100);
        let key = PrivateKey::new();
        let account = Account::new(10);

        // The bonded amount exceeds the balance; only the fee must be liquid.
        let tx = Transaction::new(
            TxKind::UnstakeRequest,
            Address::zero(),
            1_000_000,
            5,
            0,
            1_700_000_000,
            &key,
            TEST_CHAIN_ID,
        );
        pool.admit(tx, Some(&account)).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn full_pool_evicts_only_for_better_fees() {
        let pool = Mempool::new(TEST_CHAIN_ID, 2, 100);
        let a = PrivateKey::new();
        let b = PrivateKey::new();
        let c = PrivateKey::new();
        let d = PrivateKey::new();

        let cheap = transfer_tx(&a, 0, 10, 5, TEST_CHAIN_ID);
        let cheap_id = cheap.id(TEST_CHAIN_ID);
        pool.admit(cheap, Some(&rich_account())).unwrap();
        pool.admit(transfer_tx(&b, 0, 10, 10, TEST_CHAIN_ID), Some(&rich_account()))
            .unwrap();

        // Fee 3 does not beat the lowest queued fee 5.
        assert!(matches!(
            pool.admit(transfer_tx(&c, 0, 10, 3, TEST_CHAIN_ID), Some(&rich_account())),
            Err(MempoolError::FeeTooLow { got: 3, lowest: 5 })
        ));
        assert_eq!(pool.len(), 2);

        // Fee 20 evicts the fee-5 transaction.
        pool.admit(transfer_tx(&d, 0, 10, 20, TEST_CHAIN_ID), Some(&rich_account()))
            .unwrap();
        assert_eq!(pool.len(), 2);
        assert!(!pool.contains(&cheap_id));
    }

    #[test]
    fn eviction_drops_the_victims_later_nonces() {
        let pool = Mempool::new(TEST_CHAIN_ID, 2, 100);
        let victim = PrivateKey::new();
        let rich = PrivateKey::new();

        pool.admit(transfer_tx(&victim, 0, 10, 5, TEST_CHAIN_ID), Some(&rich_account()))
            .unwrap();
        pool.admit(transfer_tx(&victim, 1, 10, 50, TEST_CHAIN_ID), Some(&rich_account()))
            .unwrap();

        // The fee-5 nonce 0 is the worst entry; evicting it must also drop
        // the victim's nonce 1, which would otherwise be unexecutable.
        pool.admit(transfer_tx(&rich, 0, 10, 30, TEST_CHAIN_ID), Some(&rich_account()))
            .unwrap();
        assert_eq!(pool.len(), 1);
        let selected = pool.select(10);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].sender(), rich.address());
    }

    #[test]
    fn selection_keeps_per_sender_nonce_order() {
        let pool = Mempool::new(TEST_CHAIN_ID, 100, 100);
        let key = PrivateKey::new();

        // Later nonce pays more but must not jump the queue.
        pool.admit(transfer_tx(&key, 0, 10, 1, TEST_CHAIN_ID), Some(&rich_account()))
            .unwrap();
        pool.admit(transfer_tx(&key, 1, 10, 100, TEST_CHAIN_ID), Some(&rich_account()))
            .unwrap();

        let selected = pool.select(10);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].nonce, 0);
        assert_eq!(selected[1].nonce, 1);
    }

    #[test]
    fn select_respects_the_limit() {
        let pool = Mempool::new(TEST_CHAIN_ID, 100, 100);
        for _ in 0..5 {
            let key = PrivateKey::new();
            pool.admit(transfer_tx(&key, 0, 10, 1, TEST_CHAIN_ID), Some(&rich_account()))
                .unwrap();
        }
        assert_eq!(pool.select(3).len(), 3);
    }

    #[test]
    fn confirmed_transactions_cannot_replay() {
        let pool = Mempool::new(TEST_CHAIN_ID, 100, 100);
        let key = PrivateKey::new();
        let tx = transfer_tx(&key, 0, 10, 1, TEST_CHAIN_ID);

        pool.admit(tx.clone(), Some(&rich_account())).unwrap();
        pool.mark_confirmed(std::slice::from_ref(&tx));
        assert!(pool.is_empty());

        assert!(matches!(
            pool.admit(tx, Some(&rich_account())),
            Err(MempoolError::RecentlyConfirmed(_))
        ));
    }

    #[test]
    fn confirming_a_competitor_drops_the_queued_transaction() {
        let pool = Mempool::new(TEST_CHAIN_ID, 100, 100);
        let key = PrivateKey::new();

        let queued = transfer_tx(&key, 0, 10, 1, TEST_CHAIN_ID);
        let queued_id = queued.id(TEST_CHAIN_ID);
        pool.admit(queued, Some(&rich_account())).unwrap();

        // A different transaction at the same sender and nonce confirms.
        let rival = transfer_tx(&key, 0, 20, 2, TEST_CHAIN_ID);
        pool.mark_confirmed(std::slice::from_ref(&rival));

        assert!(!pool.contains(&queued_id));
        assert!(pool.is_empty());
    }

    #[test]
    fn reorged_sender_can_backfill_lower_nonces() {
        let pool = Mempool::new(TEST_CHAIN_ID, 100, 100);
        let key = PrivateKey::new();

        // Nonces 2 and 3 queue against an account confirmed at nonce 2.
        let confirmed = Account::with(2, 1_000_000);
        pool.admit(transfer_tx(&key, 2, 10, 1, TEST_CHAIN_ID), Some(&confirmed))
            .unwrap();
        pool.admit(transfer_tx(&key, 3, 10, 1, TEST_CHAIN_ID), Some(&confirmed))
            .unwrap();

        // A reorg rolls the account back to nonce 0; the abandoned nonce 0
        // and 1 transactions must close the gap below the queue.
        let rolled_back = Account::with(0, 1_000_000);
        pool.readmit(transfer_tx(&key, 0, 10, 1, TEST_CHAIN_ID), Some(&rolled_back))
            .unwrap();
        pool.readmit(transfer_tx(&key, 1, 10, 1, TEST_CHAIN_ID), Some(&rolled_back))
            .unwrap();

        let nonces: Vec<u64> = pool.select(10).iter().map(|tx| tx.nonce).collect();
        assert_eq!(nonces, vec![0, 1, 2, 3]);
    }

    #[test]
    fn recent_set_is_bounded() {
        let pool = Mempool::new(TEST_CHAIN_ID, 100, 1);
        let key_a = PrivateKey::new();
        let key_b = PrivateKey::new();
        let tx_a = transfer_tx(&key_a, 0, 10, 1, TEST_CHAIN_ID);
        let tx_b = transfer_tx(&key_b, 0, 10, 1, TEST_CHAIN_ID);

        pool.mark_confirmed(std::slice::from_ref(&tx_a));
        pool.mark_confirmed(std::slice::from_ref(&tx_b));

        // tx_a aged out of the single-entry ring and is admissible again.
        pool.admit(tx_a, Some(&rich_account())).unwrap();
        assert!(matches!(
            pool.admit(tx_b, Some(&rich_account())),
            Err(MempoolError::RecentlyConfirmed(_))
        ));
    }

    #[test]
    fn readmission_clears_the_recent_entry() {
        let pool = Mempool::new(TEST_CHAIN_ID, 100, 100);
        let key = PrivateKey::new();
        let tx = transfer_tx(&key, 0, 10, 1, TEST_CHAIN_ID);

        pool.admit(tx.clone(), Some(&rich_account())).unwrap();
        pool.mark_confirmed(std::slice::from_ref(&tx));

        pool.readmit(tx.clone(), Some(&rich_account())).unwrap();
        assert!(pool.contains(&tx.id(TEST_CHAIN_ID)));
    }
}
