//! Blocks and the hash chain linkage.

use crate::encoding::CanonicalEncoder;
use crate::hash::{hash, Hash, MAX_DIFFICULTY};
use crate::merkle::{transactions_root, MerkleError};
use crate::transaction::{current_timestamp, Transaction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current block format version.
pub const BLOCK_VERSION: u32 = 0;

/// Sequence id of a block (genesis = 0).
pub type BlockId = u64;

/// Lifecycle of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStatus {
    /// Drafted by a generator, awaiting votes.
    Proposed,
    /// Appended to a ledger.
    Confirmed,
    /// Refused by consensus and discarded.
    Rejected,
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Proposed => "proposed",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// An ordered batch of transactions plus linkage and consensus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub version: u32,
    /// Sequence id, monotonic along the chain.
    pub id: BlockId,
    pub transactions: Vec<Transaction>,
    /// Hash of the parent block (`Hash::ZERO` for genesis).
    pub previous_hash: Hash,
    /// Merkle root of `transactions` (`Hash::ZERO` for genesis).
    pub merkle_hash: Hash,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Identity of the validator that drafted the block.
    pub generator_address: String,
    /// Consensus token the block was accepted with.
    pub generation_proof: Option<Hash>,
    pub nonce: u64,
    pub status: BlockStatus,
    pub transaction_count: u64,
    /// Cached result of [`Block::compute_hash`].
    hash: Option<Hash>,
}

impl Block {
    /// The fixed genesis block.
    ///
    /// Every field is constant so all validators derive the same genesis hash.
    pub fn genesis() -> Self {
        let mut block = Self {
            version: BLOCK_VERSION,
            id: 0,
            transactions: Vec::new(),
            previous_hash: Hash::ZERO,
            merkle_hash: Hash::ZERO,
            timestamp: 0,
            generator_address: String::new(),
            generation_proof: None,
            nonce: 0,
            status: BlockStatus::Confirmed,
            transaction_count: 0,
            hash: None,
        };
        block.hash = Some(block.compute_hash());
        block
    }

    /// Draft a proposed block extending `parent` with the given transactions.
    pub fn draft(
        parent: &Block,
        transactions: Vec<Transaction>,
        generator_address: impl Into<String>,
    ) -> Result<Self, MerkleError> {
        let merkle_hash = transactions_root(&transactions)?;
        Ok(Self {
            version: parent.version,
            id: parent.id + 1,
            transaction_count: transactions.len() as u64,
            transactions,
            previous_hash: parent.hash(),
            merkle_hash,
            timestamp: current_timestamp(),
            generator_address: generator_address.into(),
            generation_proof: None,
            nonce: 0,
            status: BlockStatus::Proposed,
            hash: None,
        })
    }

    /// Hash over `(version, id, merkle_hash, previous_hash, timestamp, generator_address, nonce)`.
    pub fn compute_hash(&self) -> Hash {
        let mut enc = CanonicalEncoder::new();
        enc.put_u32(self.version)
            .put_u64(self.id)
            .put_hash(&self.merkle_hash)
            .put_hash(&self.previous_hash)
            .put_u64(self.timestamp)
            .put_str(&self.generator_address)
            .put_u64(self.nonce);
        hash(&enc.finish())
    }

    /// The block hash, computed on first use when not cached.
    pub fn hash(&self) -> Hash {
        self.hash.unwrap_or_else(|| self.compute_hash())
    }

    /// The cached hash, if one has been stored.
    pub fn cached_hash(&self) -> Option<Hash> {
        self.hash
    }

    /// Store `hash` as this block's hash.
    pub fn set_hash(&mut self, hash: Hash) {
        self.hash = Some(hash);
    }

    /// Search for a nonce whose block hash has `difficulty` leading zero hex
    /// digits, starting from the current nonce. Caches and returns the hash.
    ///
    /// Returns `None` when `difficulty` is above [`MAX_DIFFICULTY`] or the
    /// nonces up to `u64::MAX` are exhausted without a match.
    pub fn seal(&mut self, difficulty: usize) -> Option<Hash> {
        if difficulty > MAX_DIFFICULTY {
            return None;
        }
        loop {
            let candidate = self.compute_hash();
            if candidate.meets_difficulty(difficulty) {
                self.hash = Some(candidate);
                return Some(candidate);
            }
            self.nonce = self.nonce.checked_add(1)?;
        }
    }

    /// Check if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.id == 0 && self.previous_hash == Hash::ZERO
    }

    /// Get the number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Verify the merkle hash and transaction count match the transactions.
    pub fn verify_merkle_hash(&self) -> bool {
        if self.transaction_count != self.transactions.len() as u64 {
            return false;
        }
        if self.transactions.is_empty() {
            return self.merkle_hash == Hash::ZERO;
        }
        transactions_root(&self.transactions).is_ok_and(|root| root == self.merkle_hash)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block #{} [{}] {} txs, hash {}, prev {}",
            self.id,
            self.status,
            self.transaction_count,
            self.hash(),
            self.previous_hash
        )
    }
}
