//! Account state: balance and replay-protection nonce.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};

/// Balance and nonce for a single address.
///
/// Owned by the state machine and mutated only through block application and
/// delta rollback; everything else sees read-only copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Monotonic counter of applied transactions from this account.
    nonce: u64,
    /// Spendable balance in the native currency.
    balance: u128,
}

impl Account {
    /// Creates a fresh account with the given balance and a zero nonce.
    pub fn new(balance: u128) -> Self {
        Self { nonce: 0, balance }
    }

    /// Creates an account with explicit nonce and balance.
    pub fn with(nonce: u64, balance: u128) -> Self {
        Self { nonce, balance }
    }

    /// Returns the account's current balance.
    pub fn balance(&self) -> u128 {
        self.balance
    }

    /// Returns the account's current nonce.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Adds funds to the balance, saturating at the maximum.
    pub fn credit(&mut self, amount: u128) {
        self.balance = self.balance.saturating_add(amount);
    }

    /// Removes funds from the balance.
    ///
    /// Returns `false` and leaves the account untouched when the balance
    /// cannot cover `amount`.
    pub fn debit(&mut self, amount: u128) -> bool {
        match self.balance.checked_sub(amount) {
            Some(rest) => {
                self.balance = rest;
                true
            }
            None => false,
        }
    }

    /// Advances the nonce after a successfully applied transaction.
    pub fn bump_nonce(&mut self) {
        self.nonce += 1;
    }
}

impl Encode for Account {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.nonce.encode(out);
        self.balance.encode(out);
    }
}

impl Decode for Account {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Account {
            nonce: u64::decode(input)?,
            balance: u128::decode(input)?,
        })
    }
}
