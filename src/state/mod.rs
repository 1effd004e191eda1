//! Deterministic state machine with rollback deltas.
//!
//! Holds accounts, validator records, and opaque per-contract storage for a
//! single branch at a single height. Block application is atomic: either
//! every transaction in the block applies and a [`StateDelta`] describing
//! all mutations is returned, or the state is left exactly as it was.
//! Deltas capture before/after images per touched entry, so
//! [`StateMachine::rollback`] restores the precise prior state and
//! [`StateMachine::replay`] re-applies a stored delta without re-execution.

use crate::consensus::pos;
use crate::consensus::validators::{ValidatorRecord, ValidatorStatus};
use crate::core::ValidationError;
use crate::core::account::Account;
use crate::core::block::{Block, Seal};
use crate::core::params::ChainParams;
use crate::core::transaction::{Transaction, TxKind};
use crate::types::address::Address;
use crate::types::hash::Hash;
use std::collections::BTreeMap;

/// A single recorded mutation with its before and after image.
///
/// `None` means the entry did not exist on that side of the mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOp {
    Account {
        address: Address,
        before: Option<Account>,
        after: Option<Account>,
    },
    Validator {
        address: Address,
        before: Option<ValidatorRecord>,
        after: Option<ValidatorRecord>,
    },
    ContractCell {
        owner: Address,
        key: Hash,
        before: Option<Vec<u8>>,
        after: Option<Vec<u8>>,
    },
}

/// Ordered mutation log produced by applying one block.
///
/// Rolling back a delta in reverse order restores the exact prior state even
/// when the same entry was touched multiple times.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDelta {
    ops: Vec<DeltaOp>,
}

impl StateDelta {
    /// Returns the number of recorded mutations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true when no mutation was recorded.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the recorded mutations in application order.
    pub fn ops(&self) -> &[DeltaOp] {
        &self.ops
    }

    /// Appends all mutations of `other`, preserving order.
    ///
    /// Used to anchor slashing penalties to the delta of the tip block so a
    /// reorg rolls them back together with the block.
    pub fn merge(&mut self, other: StateDelta) {
        self.ops.extend(other.ops);
    }
}

/// Ledger state for one branch at one height.
pub struct StateMachine {
    chain_id: u64,
    fee_sink: Address,
    accounts: BTreeMap<Address, Account>,
    validators: BTreeMap<Address, ValidatorRecord>,
    contracts: BTreeMap<(Address, Hash), Vec<u8>>,
}

impl StateMachine {
    /// Builds the genesis state from chain parameters.
    pub fn from_genesis(params: &ChainParams) -> Self {
        let mut accounts = BTreeMap::new();
        for alloc in &params.genesis.accounts {
            accounts.insert(alloc.address, Account::new(alloc.balance));
        }

        let mut validators = BTreeMap::new();
        for v in &params.genesis.validators {
            validators.insert(v.address, ValidatorRecord::active(v.address, v.stake));
        }

        Self {
            chain_id: params.chain_id,
            fee_sink: params.fee_sink,
            accounts,
            validators,
            contracts: BTreeMap::new(),
        }
    }

    /// Returns the account stored for `address`, if any.
    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Returns the balance for `address`, zero when absent.
    pub fn balance_of(&self, address: &Address) -> u128 {
        self.accounts.get(address).map_or(0, Account::balance)
    }

    /// Returns the confirmed nonce for `address`, zero when absent.
    pub fn nonce_of(&self, address: &Address) -> u64 {
        self.accounts.get(address).map_or(0, Account::nonce)
    }

    /// Returns the validator record for `address`, if any.
    pub fn validator(&self, address: &Address) -> Option<&ValidatorRecord> {
        self.validators.get(address)
    }

    /// Returns all validator records, ordered by address.
    pub fn validator_set(&self) -> impl Iterator<Item = &ValidatorRecord> {
        self.validators.values()
    }

    /// Returns `(address, stake)` for every active validator, ordered by address.
    ///
    /// The ordering makes stake-weighted producer draws reproducible on
    /// every node holding the same state.
    pub fn active_validators(&self, min_stake: u128) -> Vec<(Address, u128)> {
        self.validators
            .values()
            .filter(|v| v.is_active(min_stake))
            .map(|v| (v.address, v.stake))
            .collect()
    }

    /// Returns the total stake across active validators.
    pub fn total_active_stake(&self, min_stake: u128) -> u128 {
        self.active_validators(min_stake)
            .iter()
            .map(|(_, s)| s)
            .sum()
    }

    /// Reads an opaque contract storage cell.
    pub fn contract_cell(&self, owner: &Address, key: &Hash) -> Option<&[u8]> {
        self.contracts
            .get(&(*owner, *key))
            .map(Vec::as_slice)
    }

    /// Writes an opaque contract storage cell, recording the mutation.
    ///
    /// Exposed for the contract execution layer so its writes ride the same
    /// delta as the enclosing block and roll back with it.
    pub fn set_contract_cell(
        &mut self,
        delta: &mut StateDelta,
        owner: Address,
        key: Hash,
        after: Option<Vec<u8>>,
    ) {
        let before = self.contracts.get(&(owner, key)).cloned();
        match &after {
            Some(value) => {
                self.contracts.insert((owner, key), value.clone());
            }
            None => {
                self.contracts.remove(&(owner, key));
            }
        }
        delta.ops.push(DeltaOp::ContractCell {
            owner,
            key,
            before,
            after,
        });
    }

    fn set_account(&mut self, delta: &mut StateDelta, address: Address, after: Option<Account>) {
        let before = self.accounts.get(&address).cloned();
        match &after {
            Some(account) => {
                self.accounts.insert(address, account.clone());
            }
            None => {
                self.accounts.remove(&address);
            }
        }
        delta.ops.push(DeltaOp::Account {
            address,
            before,
            after,
        });
    }

    fn set_validator(
        &mut self,
        delta: &mut StateDelta,
        address: Address,
        after: Option<ValidatorRecord>,
    ) {
        let before = self.validators.get(&address).cloned();
        match &after {
            Some(record) => {
                self.validators.insert(address, record.clone());
            }
            None => {
                self.validators.remove(&address);
            }
        }
        delta.ops.push(DeltaOp::Validator {
            address,
            before,
            after,
        });
    }

    fn credit_account(&mut self, delta: &mut StateDelta, address: Address, amount: u128) {
        let mut after = self
            .accounts
            .get(&address)
            .cloned()
            .unwrap_or_else(|| Account::new(0));
        after.credit(amount);
        self.set_account(delta, address, Some(after));
    }

    /// Applies a block's transactions and validator transitions.
    ///
    /// The state must currently be at the block's parent. On success the
    /// state is at the new block and the returned delta undoes it; on error
    /// every partial mutation is rolled back before returning.
    pub fn apply_block(
        &mut self,
        block: &Block,
        params: &ChainParams,
    ) -> Result<StateDelta, ValidationError> {
        let mut delta = StateDelta::default();
        let height = block.header.height;

        if let Seal::Pos { slot, .. } = block.header.seal {
            self.record_slot_misses(&mut delta, block, slot, params);
        }

        for tx in block.transactions.iter() {
            if let Err(err) = self.apply_tx(&mut delta, tx, height, params) {
                self.rollback(&delta);
                return Err(err);
            }
        }

        if params.staking.epoch_blocks > 0 && height > 0 && height % params.staking.epoch_blocks == 0
        {
            self.process_epoch_boundary(&mut delta, height);
        }

        Ok(delta)
    }

    fn apply_tx(
        &mut self,
        delta: &mut StateDelta,
        tx: &Transaction,
        height: u64,
        params: &ChainParams,
    ) -> Result<(), ValidationError> {
        if !tx.verify(self.chain_id) {
            return Err(ValidationError::InvalidTransactionSignature(
                tx.id(self.chain_id),
            ));
        }

        let sender = tx.sender();
        let account = self
            .accounts
            .get(&sender)
            .cloned()
            .unwrap_or_else(|| Account::new(0));

        if tx.nonce != account.nonce() {
            return Err(ValidationError::NonceMismatch {
                address: sender,
                expected: account.nonce(),
                got: tx.nonce,
            });
        }

        let cost = tx.required_balance();
        if account.balance() < cost {
            return Err(ValidationError::InsufficientBalance {
                address: sender,
                required: cost,
                available: account.balance(),
            });
        }

        match tx.kind {
            TxKind::Transfer => {
                let mut debited = account;
                debited.debit(cost);
                debited.bump_nonce();
                self.set_account(delta, sender, Some(debited));
                self.credit_account(delta, tx.recipient, tx.amount);
            }
            TxKind::StakeDeposit => {
                match self.validators.get(&sender).cloned() {
                    Some(mut record) if record.status != ValidatorStatus::Ejected => {
                        record.stake = record.stake.saturating_add(tx.amount);
                        self.set_validator(delta, sender, Some(record));
                    }
                    Some(_) | None => {
                        if tx.amount < params.staking.min_stake {
                            return Err(ValidationError::StakeBelowMinimum {
                                address: sender,
                                got: tx.amount,
                                min: params.staking.min_stake,
                            });
                        }
                        let activation = height + params.staking.activation_delay_blocks;
                        self.set_validator(
                            delta,
                            sender,
                            Some(ValidatorRecord::bonding(sender, tx.amount, activation)),
                        );
                    }
                }
                let mut debited = account;
                debited.debit(cost);
                debited.bump_nonce();
                self.set_account(delta, sender, Some(debited));
            }
            TxKind::UnstakeRequest => {
                let mut record = match self.validators.get(&sender).cloned() {
                    Some(r) if r.status != ValidatorStatus::Ejected => r,
                    _ => return Err(ValidationError::NotAValidator { address: sender }),
                };
                if tx.amount > record.stake {
                    return Err(ValidationError::UnstakeExceedsBond {
                        address: sender,
                        got: tx.amount,
                        bonded: record.stake,
                    });
                }
                record.stake -= tx.amount;
                record.unbonding_amount = record.unbonding_amount.saturating_add(tx.amount);
                record.release_height = height + params.staking.unbonding_period_blocks;
                if record.stake < params.staking.min_stake {
                    record.status = ValidatorStatus::Unbonding;
                }
                self.set_validator(delta, sender, Some(record));

                let mut debited = account;
                debited.debit(tx.fee);
                debited.bump_nonce();
                self.set_account(delta, sender, Some(debited));
            }
        }

        if tx.fee > 0 {
            self.credit_account(delta, self.fee_sink, tx.fee);
        }

        Ok(())
    }

    /// Records slot skips preceding a proof-of-stake block and the penalties
    /// they trigger.
    ///
    /// For a block sealed at slot `s`, the producers drawn for slots `0..s`
    /// each missed their slot. A miss streak reaching the configured
    /// threshold burns the offline penalty, resets the streak, and counts an
    /// offense; enough offenses eject the validator.
    fn record_slot_misses(
        &mut self,
        delta: &mut StateDelta,
        block: &Block,
        sealed_slot: u32,
        params: &ChainParams,
    ) {
        let active = self.active_validators(params.staking.min_stake);
        for slot in 0..sealed_slot {
            let seed = pos::seed(
                self.chain_id,
                block.header.previous_block,
                block.header.height,
                slot,
            );
            let Some(missed) = pos::select_producer(seed, &active) else {
                continue;
            };
            let Some(mut record) = self.validators.get(&missed).cloned() else {
                continue;
            };

            record.miss_streak += 1;
            if record.miss_streak >= params.slashing.offline_miss_threshold {
                let burn = slash_amount(record.stake, params.slashing.offline_slash_bps);
                record.stake -= burn;
                record.miss_streak = 0;
                record.offenses += 1;
                if record.offenses >= params.slashing.max_offenses {
                    self.eject(&mut record, block.header.height, params);
                }
            }
            self.set_validator(delta, missed, Some(record));
        }

        // The sealing producer showed up; its streak starts over.
        if let Some(mut record) = self.validators.get(&block.header.producer).cloned() {
            if record.miss_streak > 0 {
                record.miss_streak = 0;
                self.set_validator(delta, block.header.producer, Some(record));
            }
        }
    }

    fn eject(&self, record: &mut ValidatorRecord, height: u64, params: &ChainParams) {
        record.status = ValidatorStatus::Ejected;
        record.unbonding_amount = record.unbonding_amount.saturating_add(record.stake);
        record.stake = 0;
        record.release_height = height + params.staking.unbonding_period_blocks;
    }

    /// Burns stake for proven double-signing, recorded into `delta`.
    ///
    /// Counts an offense; at the configured limit the validator is ejected
    /// and its remaining stake scheduled for release after the unbonding
    /// period.
    ///
    /// Returns the burned amount.
    pub fn apply_double_sign_penalty(
        &mut self,
        delta: &mut StateDelta,
        address: Address,
        height: u64,
        params: &ChainParams,
    ) -> Option<u128> {
        let mut record = self.validators.get(&address).cloned()?;

        let burn = slash_amount(record.stake, params.slashing.double_sign_slash_bps);
        record.stake -= burn;
        record.offenses += 1;
        if record.offenses >= params.slashing.max_offenses {
            self.eject(&mut record, height, params);
        }
        self.set_validator(delta, address, Some(record));
        Some(burn)
    }

    /// Validator set transitions at an epoch boundary.
    ///
    /// Bonding records past their activation height become active, matured
    /// unbonding funds are paid out, and drained records are dropped.
    fn process_epoch_boundary(&mut self, delta: &mut StateDelta, height: u64) {
        let addresses: Vec<Address> = self.validators.keys().copied().collect();
        for address in addresses {
            let Some(mut record) = self.validators.get(&address).cloned() else {
                continue;
            };
            let mut touched = false;

            if record.status == ValidatorStatus::Bonding && height >= record.activation_height {
                record.status = ValidatorStatus::Active;
                touched = true;
            }

            if record.unbonding_amount > 0 && height >= record.release_height {
                let released = record.unbonding_amount;
                record.unbonding_amount = 0;
                touched = true;
                self.credit_account(delta, address, released);
            }

            let drained = record.stake == 0
                && record.unbonding_amount == 0
                && matches!(
                    record.status,
                    ValidatorStatus::Unbonding | ValidatorStatus::Ejected
                );

            if drained {
                self.set_validator(delta, address, None);
            } else if touched {
                self.set_validator(delta, address, Some(record));
            }
        }
    }

    /// Restores the state to before `delta` was applied.
    pub fn rollback(&mut self, delta: &StateDelta) {
        for op in delta.ops.iter().rev() {
            match op {
                DeltaOp::Account {
                    address, before, ..
                } => match before {
                    Some(account) => {
                        self.accounts.insert(*address, account.clone());
                    }
                    None => {
                        self.accounts.remove(address);
                    }
                },
                DeltaOp::Validator {
                    address, before, ..
                } => match before {
                    Some(record) => {
                        self.validators.insert(*address, record.clone());
                    }
                    None => {
                        self.validators.remove(address);
                    }
                },
                DeltaOp::ContractCell {
                    owner, key, before, ..
                } => match before {
                    Some(value) => {
                        self.contracts.insert((*owner, *key), value.clone());
                    }
                    None => {
                        self.contracts.remove(&(*owner, *key));
                    }
                },
            }
        }
    }

    /// Re-applies a previously recorded delta without re-executing its block.
    ///
    /// Used when switching branches: the fork resolver replays stored deltas
    /// from the fork point to the new tip.
    pub fn replay(&mut self, delta: &StateDelta) {
        for op in &delta.ops {
            match op {
                DeltaOp::Account { address, after, .. } => match after {
                    Some(account) => {
                        self.accounts.insert(*address, account.clone());
                    }
                    None => {
                        self.accounts.remove(address);
                    }
                },
                DeltaOp::Validator { address, after, .. } => match after {
                    Some(record) => {
                        self.validators.insert(*address, record.clone());
                    }
                    None => {
                        self.validators.remove(address);
                    }
                },
                DeltaOp::ContractCell {
                    owner, key, after, ..
                } => match after {
                    Some(value) => {
                        self.contracts.insert((*owner, *key), value.clone());
                    }
                    None => {
                        self.contracts.remove(&(*owner, *key));
                    }
                },
            }
        }
    }
}

/// Computes a basis-point share of `stake`, rounding down.
pub fn slash_amount(stake: u128, bps: u16) -> u128 {
    stake / 10_000 * (bps as u128) + (stake % 10_000) * (bps as u128) / 10_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::{ChainParams, GenesisAccount, GenesisValidator};
    use crate::crypto::key_pair::PrivateKey;
    use crate::utils::test_utils::utils::{sealed_block, transfer_tx};

    fn funded_params(keys: &[&PrivateKey], balance: u128) -> ChainParams {
        let accounts = keys
            .iter()
            .map(|k| GenesisAccount {
                address: k.address(),
                balance,
            })
            .collect();
        ChainParams::dev_pow(accounts)
    }

    fn pow_block(height: u64, txs: Vec<Transaction>, params: &ChainParams) -> Block {
        let producer = PrivateKey::from_bytes(&[0x42; 32]).unwrap();
        sealed_block(
            height,
            Hash::zero(),
            1_700_000_000 + height * 60,
            txs,
            &producer,
            Seal::Pow {
                nonce: 0,
                difficulty: 1,
            },
            params.chain_id,
        )
    }

    #[test]
    fn transfer_moves_funds_and_fee() {
        let key = PrivateKey::new();
        let params = funded_params(&[&key], 1_000);
        let mut state = StateMachine::from_genesis(&params);

        let tx = transfer_tx(&key, 0, 300, 10, params.chain_id);
        let recipient = tx.recipient;
        let block = pow_block(1, vec![tx], &params);

        let delta = state.apply_block(&block, &params).expect("apply");
        assert!(!delta.is_empty());
        assert_eq!(state.balance_of(&key.address()), 690);
        assert_eq!(state.balance_of(&recipient), 300);
        assert_eq!(state.balance_of(&params.fee_sink), 10);
        assert_eq!(state.nonce_of(&key.address()), 1);
    }

    #[test]
    fn nonce_mismatch_rejects_double_spend() {
        let key = PrivateKey::new();
        let params = funded_params(&[&key], 1_000);
        let mut state = StateMachine::from_genesis(&params);

        let tx_a = transfer_tx(&key, 0, 100, 1, params.chain_id);
        let tx_b = transfer_tx(&key, 0, 100, 1, params.chain_id);
        let block = pow_block(1, vec![tx_a, tx_b], &params);

        let err = state.apply_block(&block, &params).unwrap_err();
        assert!(matches!(err, ValidationError::NonceMismatch { got: 0, .. }));
        // Atomic: the first transfer must not have stuck.
        assert_eq!(state.balance_of(&key.address()), 1_000);
        assert_eq!(state.nonce_of(&key.address()), 0);
    }

    #[test]
    fn insufficient_balance_rejects_block() {
        let key = PrivateKey::new();
        let params = funded_params(&[&key], 50);
        let mut state = StateMachine::from_genesis(&params);

        let tx = transfer_tx(&key, 0, 100, 1, params.chain_id);
        let block = pow_block(1, vec![tx], &params);

        assert!(matches!(
            state.apply_block(&block, &params),
            Err(ValidationError::InsufficientBalance { .. })
        ));
        assert_eq!(state.balance_of(&key.address()), 50);
    }

    #[test]
    fn rollback_restores_exact_prior_state() {
        let key = PrivateKey::new();
        let params = funded_params(&[&key], 1_000);
        let mut state = StateMachine::from_genesis(&params);

        let tx = transfer_tx(&key, 0, 300, 10, params.chain_id);
        let recipient = tx.recipient;
        let block = pow_block(1, vec![tx], &params);

        let delta = state.apply_block(&block, &params).expect("apply");
        state.rollback(&delta);

        assert_eq!(state.balance_of(&key.address()), 1_000);
        assert_eq!(state.nonce_of(&key.address()), 0);
        assert_eq!(state.balance_of(&recipient), 0);
        assert!(state.account(&recipient).is_none());
        assert!(state.account(&params.fee_sink).is_none());
    }

    #[test]
    fn replay_reproduces_applied_state() {
        let key = PrivateKey::new();
        let params = funded_params(&[&key], 1_000);
        let mut state = StateMachine::from_genesis(&params);

        let tx = transfer_tx(&key, 0, 300, 10, params.chain_id);
        let block = pow_block(1, vec![tx], &params);

        let delta = state.apply_block(&block, &params).expect("apply");
        let balance_after = state.balance_of(&key.address());

        state.rollback(&delta);
        state.replay(&delta);
        assert_eq!(state.balance_of(&key.address()), balance_after);
    }

    #[test]
    fn stake_deposit_creates_bonding_record_then_activates() {
        let key = PrivateKey::new();
        let mut params = funded_params(&[&key], 100_000);
        params.staking.activation_delay_blocks = 2;
        params.staking.epoch_blocks = 4;
        let mut state = StateMachine::from_genesis(&params);

        let tx = Transaction::new(
            TxKind::StakeDeposit,
            Address::zero(),
            5_000,
            10,
            0,
            1,
            &key,
            params.chain_id,
        );
        let block = pow_block(1, vec![tx], &params);
        state.apply_block(&block, &params).expect("apply");

        let record = state.validator(&key.address()).expect("record");
        assert_eq!(record.status, ValidatorStatus::Bonding);
        assert_eq!(record.stake, 5_000);
        assert_eq!(state.balance_of(&key.address()), 100_000 - 5_010);

        // Epoch boundary at height 4 activates the record (activation height 3).
        let boundary = pow_block(4, vec![], &params);
        state.apply_block(&boundary, &params).expect("apply");
        assert_eq!(
            state.validator(&key.address()).unwrap().status,
            ValidatorStatus::Active
        );
        assert_eq!(state.active_validators(params.staking.min_stake).len(), 1);
    }

    #[test]
    fn stake_below_minimum_is_rejected() {
        let key = PrivateKey::new();
        let params = funded_params(&[&key], 100_000);
        let mut state = StateMachine::from_genesis(&params);

        let tx = Transaction::new(
            TxKind::StakeDeposit,
            Address::zero(),
            params.staking.min_stake - 1,
            10,
            0,
            1,
            &key,
            params.chain_id,
        );
        let block = pow_block(1, vec![tx], &params);

        assert!(matches!(
            state.apply_block(&block, &params),
            Err(ValidationError::StakeBelowMinimum { .. })
        ));
    }

    #[test]
    fn unstake_locks_funds_until_release() {
        let key = PrivateKey::new();
        let mut params = funded_params(&[&key], 100_000);
        params.genesis.validators.push(GenesisValidator {
            address: key.address(),
            stake: 10_000,
        });
        params.staking.unbonding_period_blocks = 6;
        params.staking.epoch_blocks = 4;
        let mut state = StateMachine::from_genesis(&params);

        let tx = Transaction::new(
            TxKind::UnstakeRequest,
            Address::zero(),
            10_000,
            5,
            0,
            1,
            &key,
            params.chain_id,
        );
        let block = pow_block(2, vec![tx], &params);
        state.apply_block(&block, &params).expect("apply");

        let record = state.validator(&key.address()).expect("record");
        assert_eq!(record.status, ValidatorStatus::Unbonding);
        assert_eq!(record.stake, 0);
        assert_eq!(record.unbonding_amount, 10_000);
        assert_eq!(record.release_height, 8);
        // Funds are not back yet.
        assert_eq!(state.balance_of(&key.address()), 100_000 - 5);

        // First boundary (height 4) is before release; nothing pays out.
        let early = pow_block(4, vec![], &params);
        state.apply_block(&early, &params).expect("apply");
        assert_eq!(state.balance_of(&key.address()), 100_000 - 5);

        // Boundary at height 8 releases and drops the drained record.
        let release = pow_block(8, vec![], &params);
        state.apply_block(&release, &params).expect("apply");
        assert_eq!(state.balance_of(&key.address()), 100_000 - 5 + 10_000);
        assert!(state.validator(&key.address()).is_none());
    }

    #[test]
    fn unstake_needs_only_the_fee_in_liquid_balance() {
        let key = PrivateKey::new();
        let mut params = funded_params(&[&key], 100);
        params.genesis.validators.push(GenesisValidator {
            address: key.address(),
            stake: 10_000,
        });
        let mut state = StateMachine::from_genesis(&params);

        // The full bond dwarfs the liquid balance; only the fee is debited.
        let tx = Transaction::new(
            TxKind::UnstakeRequest,
            Address::zero(),
            10_000,
            5,
            0,
            1,
            &key,
            params.chain_id,
        );
        let block = pow_block(1, vec![tx], &params);
        state.apply_block(&block, &params).expect("apply");

        assert_eq!(state.balance_of(&key.address()), 95);
        let record = state.validator(&key.address()).unwrap();
        assert_eq!(record.stake, 0);
        assert_eq!(record.unbonding_amount, 10_000);
    }

    #[test]
    fn unstake_rejects_non_validator_and_overdraw() {
        let key = PrivateKey::new();
        let mut params = funded_params(&[&key], 100_000);
        let mut state = StateMachine::from_genesis(&params);

        let tx = Transaction::new(
            TxKind::UnstakeRequest,
            Address::zero(),
            1,
            5,
            0,
            1,
            &key,
            params.chain_id,
        );
        let block = pow_block(1, vec![tx], &params);
        assert!(matches!(
            state.apply_block(&block, &params),
            Err(ValidationError::NotAValidator { .. })
        ));

        params.genesis.validators.push(GenesisValidator {
            address: key.address(),
            stake: 100,
        });
        let mut state = StateMachine::from_genesis(&params);
        let tx = Transaction::new(
            TxKind::UnstakeRequest,
            Address::zero(),
            101,
            5,
            0,
            1,
            &key,
            params.chain_id,
        );
        let block = pow_block(1, vec![tx], &params);
        assert!(matches!(
            state.apply_block(&block, &params),
            Err(ValidationError::UnstakeExceedsBond { .. })
        ));
    }

    #[test]
    fn missed_slots_accrue_offline_penalties_and_eject() {
        let validator = PrivateKey::new();
        let params = ChainParams::dev_pos(
            vec![],
            vec![GenesisValidator {
                address: validator.address(),
                stake: 10_000,
            }],
        );
        let mut state = StateMachine::from_genesis(&params);

        // Sealing at slot 3 means the producers of slots 0..3 missed; with a
        // single active validator every draw lands on it, so the streak hits
        // the threshold of 3 and burns 1%.
        let block = sealed_block(
            1,
            Hash::zero(),
            1_700_000_018,
            vec![],
            &validator,
            Seal::Pos {
                slot: 3,
                seed: Hash::zero(),
            },
            params.chain_id,
        );
        state.apply_block(&block, &params).expect("apply");

        let record = state.validator(&validator.address()).unwrap();
        assert_eq!(record.stake, 9_900);
        assert_eq!(record.miss_streak, 0);
        assert_eq!(record.offenses, 1);
        assert_eq!(record.status, ValidatorStatus::Active);

        // A second offline offense reaches the limit and ejects.
        let block = sealed_block(
            2,
            Hash::zero(),
            1_700_000_036,
            vec![],
            &validator,
            Seal::Pos {
                slot: 3,
                seed: Hash::zero(),
            },
            params.chain_id,
        );
        let delta = state.apply_block(&block, &params).expect("apply");

        let record = state.validator(&validator.address()).unwrap();
        assert_eq!(record.status, ValidatorStatus::Ejected);
        assert_eq!(record.stake, 0);
        assert_eq!(record.unbonding_amount, 9_801);

        state.rollback(&delta);
        assert_eq!(state.validator(&validator.address()).unwrap().stake, 9_900);
    }

    #[test]
    fn double_sign_penalty_burns_configured_share() {
        let key = PrivateKey::new();
        let mut params = funded_params(&[], 0);
        params.genesis.validators.push(GenesisValidator {
            address: key.address(),
            stake: 10_000,
        });
        let mut state = StateMachine::from_genesis(&params);

        let mut delta = StateDelta::default();
        let burn = state
            .apply_double_sign_penalty(&mut delta, key.address(), 5, &params)
            .expect("validator exists");

        // 1000 bps = 10%.
        assert_eq!(burn, 1_000);
        let record = state.validator(&key.address()).unwrap();
        assert_eq!(record.stake, 9_000);
        assert_eq!(record.offenses, 1);
        assert_eq!(record.status, ValidatorStatus::Active);

        // Second offense ejects and schedules the rest for release.
        state
            .apply_double_sign_penalty(&mut delta, key.address(), 6, &params)
            .expect("validator exists");
        let record = state.validator(&key.address()).unwrap();
        assert_eq!(record.status, ValidatorStatus::Ejected);
        assert_eq!(record.stake, 0);
        assert_eq!(record.unbonding_amount, 8_100);

        // Rolling the merged delta back undoes both penalties.
        state.rollback(&delta);
        assert_eq!(state.validator(&key.address()).unwrap().stake, 10_000);
    }

    #[test]
    fn contract_cells_roll_back_with_the_delta() {
        let params = funded_params(&[], 0);
        let mut state = StateMachine::from_genesis(&params);

        let owner = Address([5; 20]);
        let cell = Hash::sha3().chain(b"slot-0").finalize();

        let mut delta = StateDelta::default();
        state.set_contract_cell(&mut delta, owner, cell, Some(vec![1, 2, 3]));
        assert_eq!(state.contract_cell(&owner, &cell), Some(&[1u8, 2, 3][..]));

        state.rollback(&delta);
        assert!(state.contract_cell(&owner, &cell).is_none());
    }

    #[test]
    fn slash_amount_handles_large_stakes() {
        assert_eq!(slash_amount(10_000, 1_000), 1_000);
        assert_eq!(slash_amount(u128::MAX, 10_000), u128::MAX);
        assert_eq!(slash_amount(3, 5_000), 1);
        assert_eq!(slash_amount(0, 5_000), 0);
    }
}
