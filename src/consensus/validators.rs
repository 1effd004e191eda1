//! Validator records and lifecycle.
//!
//! Lifecycle: a stake deposit creates a `Bonding` record that becomes
//! `Active` once its activation height passes an epoch boundary. An unstake
//! request moves bonded funds into an unbonding bucket released after the
//! unbonding period. Proven misbehavior burns stake and, past the offense
//! limit, marks the record `Ejected`; ejected validators leave the active
//! set at the next epoch boundary and never produce again.

use crate::types::address::Address;

/// Lifecycle phase of a validator record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorStatus {
    /// Stake deposited, waiting for the activation delay to elapse.
    Bonding,
    /// Eligible for producer selection.
    Active,
    /// Exit requested; bonded funds locked until the release height.
    Unbonding,
    /// Removed for repeated offenses; stake no longer counts.
    Ejected,
}

/// Stake, status, and offense bookkeeping for a single validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorRecord {
    pub address: Address,
    /// Currently bonded stake, reduced by slashes and unbonding requests.
    pub stake: u128,
    pub status: ValidatorStatus,
    /// Height at which a `Bonding` record becomes eligible for activation.
    pub activation_height: u64,
    /// Height at which unbonding funds are paid back to the account.
    pub release_height: u64,
    /// Funds moved out of `stake` by an unstake request, pending release.
    pub unbonding_amount: u128,
    /// Consecutive proof-of-stake slots missed.
    pub miss_streak: u32,
    /// Slashing offenses recorded against this validator.
    pub offenses: u32,
}

impl ValidatorRecord {
    /// Creates a bonding record for a fresh deposit.
    pub fn bonding(address: Address, stake: u128, activation_height: u64) -> Self {
        Self {
            address,
            stake,
            status: ValidatorStatus::Bonding,
            activation_height,
            release_height: 0,
            unbonding_amount: 0,
            miss_streak: 0,
            offenses: 0,
        }
    }

    /// Creates an already-active record, used for genesis validators.
    pub fn active(address: Address, stake: u128) -> Self {
        Self {
            address,
            stake,
            status: ValidatorStatus::Active,
            activation_height: 0,
            release_height: 0,
            unbonding_amount: 0,
            miss_streak: 0,
            offenses: 0,
        }
    }

    /// True when this validator counts toward producer selection.
    pub fn is_active(&self, min_stake: u128) -> bool {
        self.status == ValidatorStatus::Active && self.stake >= min_stake
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_record_is_active() {
        let v = ValidatorRecord::active(Address([1; 20]), 5_000);
        assert!(v.is_active(1_000));
        assert_eq!(v.offenses, 0);
    }

    #[test]
    fn bonding_record_is_not_active() {
        let v = ValidatorRecord::bonding(Address([2; 20]), 5_000, 10);
        assert!(!v.is_active(1_000));
        assert_eq!(v.activation_height, 10);
    }

    #[test]
    fn active_below_min_stake_cannot_produce() {
        let v = ValidatorRecord::active(Address([3; 20]), 500);
        assert!(!v.is_active(1_000));
    }
}
