//! Signed transfer and staking transactions.

use crate::crypto::key_pair::{PrivateKey, PublicKey};
use crate::types::address::Address;
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::{Hash, HashCache};
use crate::types::signature::SerializableSignature;

/// Operation a transaction performs against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    /// Native token transfer between accounts.
    Transfer,
    /// Bond `amount` as validator stake for the sender.
    StakeDeposit,
    /// Request unbonding of `amount` from the sender's stake.
    UnstakeRequest,
}

impl Encode for TxKind {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        let tag: u8 = match self {
            TxKind::Transfer => 0,
            TxKind::StakeDeposit => 1,
            TxKind::UnstakeRequest => 2,
        };
        tag.encode(out);
    }
}

impl Decode for TxKind {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(TxKind::Transfer),
            1 => Ok(TxKind::StakeDeposit),
            2 => Ok(TxKind::UnstakeRequest),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

/// A signed ledger transaction.
///
/// Immutable after creation. The signature covers a chain-bound hash of the
/// payload fields, so a transaction signed for one chain can never replay on
/// another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Sender's public key; the sender address derives from it.
    pub from: PublicKey,
    /// Schnorr signature over the chain-bound signing hash.
    pub signature: SerializableSignature,

    /// Cached transaction id, computed lazily on first access.
    cached_id: HashCache,

    /// Operation this transaction performs.
    pub kind: TxKind,
    /// Recipient of a transfer; ignored for staking operations.
    pub recipient: Address,
    /// Native token amount moved (transfer value or stake amount).
    pub amount: u128,
    /// Fee paid to the block fee sink on inclusion.
    pub fee: u128,
    /// Monotonic counter preventing replay for this sender.
    pub nonce: u64,
    /// Unix timestamp in seconds at creation.
    pub timestamp: u64,
}

impl Transaction {
    /// Creates a new signed transaction bound to `chain_id`.
    pub fn new(
        kind: TxKind,
        recipient: Address,
        amount: u128,
        fee: u128,
        nonce: u64,
        timestamp: u64,
        key: &PrivateKey,
        chain_id: u64,
    ) -> Self {
        let from = key.public_key();
        let signing_hash = Self::signing_hash_from_parts(
            chain_id, &from, kind, &recipient, amount, fee, nonce, timestamp,
        );

        Transaction {
            from,
            signature: key.sign(signing_hash.as_slice()),
            cached_id: HashCache::new(),
            kind,
            recipient,
            amount,
            fee,
            nonce,
            timestamp,
        }
    }

    /// Returns the sender address.
    pub fn sender(&self) -> Address {
        self.from.address
    }

    /// Returns the hash that was signed to produce this transaction's signature.
    pub fn signing_hash(&self, chain_id: u64) -> Hash {
        Self::signing_hash_from_parts(
            chain_id,
            &self.from,
            self.kind,
            &self.recipient,
            self.amount,
            self.fee,
            self.nonce,
            self.timestamp,
        )
    }

    /// Returns the unique transaction identifier.
    ///
    /// Computed over the full transaction including the signature, so two
    /// identical payloads signed by different keys have distinct ids.
    /// The result is cached.
    pub fn id(&self, chain_id: u64) -> Hash {
        self.cached_id.get_or_compute(chain_id, || {
            let mut h = Hash::sha3();
            h.update(b"TXID");
            chain_id.encode(&mut h);
            self.encode(&mut h);
            h.finalize()
        })
    }

    /// Verifies the transaction signature against the sender's public key.
    pub fn verify(&self, chain_id: u64) -> bool {
        let hash = self.signing_hash(chain_id);
        self.from.verify(hash.as_slice(), self.signature)
    }

    /// Amount plus fee, saturating at the maximum.
    pub fn total_cost(&self) -> u128 {
        self.amount.saturating_add(self.fee)
    }

    /// Balance the sender must hold for this transaction to apply.
    ///
    /// An unstake moves bonded funds, not liquid ones, so only its fee
    /// draws on the balance.
    pub fn required_balance(&self) -> u128 {
        match self.kind {
            TxKind::UnstakeRequest => self.fee,
            TxKind::Transfer | TxKind::StakeDeposit => self.total_cost(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn signing_hash_from_parts(
        chain_id: u64,
        from: &PublicKey,
        kind: TxKind,
        recipient: &Address,
        amount: u128,
        fee: u128,
        nonce: u64,
        timestamp: u64,
    ) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"TX");
        chain_id.encode(&mut h);
        from.encode(&mut h);
        kind.encode(&mut h);
        recipient.encode(&mut h);
        amount.encode(&mut h);
        fee.encode(&mut h);
        nonce.encode(&mut h);
        timestamp.encode(&mut h);
        h.finalize()
    }
}

impl Encode for Transaction {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.from.encode(out);
        self.signature.encode(out);
        self.kind.encode(out);
        self.recipient.encode(out);
        self.amount.encode(out);
        self.fee.encode(out);
        self.nonce.encode(out);
        self.timestamp.encode(out);
    }
}

impl Decode for Transaction {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Transaction {
            from: PublicKey::decode(input)?,
            signature: SerializableSignature::decode(input)?,
            cached_id: HashCache::new(),
            kind: TxKind::decode(input)?,
            recipient: Address::decode(input)?,
            amount: u128::decode(input)?,
            fee: u128::decode(input)?,
            nonce: u64::decode(input)?,
            timestamp: u64::decode(input)?,
        })
    }
}
