//! Pending-transaction pool.
//!
//! Each validator keeps its own pool in arrival order. Consensus refers to
//! pool entries by index range, so the pool never reorders or deduplicates:
//! entries leave only when a block containing them is committed.

use pkchain_consensus::{verify_txs_from_merkle_root, Vote};
use pkchain_core::{Hash, Transaction};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during mempool operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MempoolError {
    #[error("mempool is full (capacity: {0})")]
    MempoolFull(usize),

    #[error("range {first}..={last} out of bounds (pool holds {len})")]
    Range {
        first: usize,
        last: usize,
        len: usize,
    },
}

pub type Result<T> = std::result::Result<T, MempoolError>;

/// Configuration for the mempool.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum number of pending transactions.
    pub max_transactions: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
        }
    }
}

/// FIFO buffer of pending transactions.
#[derive(Debug, Clone)]
pub struct MempoolPool {
    config: MempoolConfig,
    transactions: Vec<Transaction>,
}

impl MempoolPool {
    /// Create a new pool with default configuration.
    pub fn new() -> Self {
        Self::with_config(MempoolConfig::default())
    }

    /// Create a new pool with the given configuration.
    pub fn with_config(config: MempoolConfig) -> Self {
        Self {
            config,
            transactions: Vec::new(),
        }
    }

    /// Get the number of pending transactions.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Check if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Get the transaction at `index`.
    pub fn get(&self, index: usize) -> Option<&Transaction> {
        self.transactions.get(index)
    }

    /// All pending transactions, oldest first.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Append a transaction to the tail.
    pub fn add(&mut self, tx: Transaction) -> Result<()> {
        if self.transactions.len() >= self.config.max_transactions {
            return Err(MempoolError::MempoolFull(self.config.max_transactions));
        }
        self.transactions.push(tx);
        Ok(())
    }

    fn check_range(&self, first: usize, last: usize) -> Result<()> {
        if first > last || last >= self.transactions.len() {
            return Err(MempoolError::Range {
                first,
                last,
                len: self.transactions.len(),
            });
        }
        Ok(())
    }

    /// Transactions at indices `first..=last`, in order.
    pub fn slice(&self, first: usize, last: usize) -> Result<&[Transaction]> {
        self.check_range(first, last)?;
        Ok(&self.transactions[first..=last])
    }

    /// Drop the transactions at indices `first..=last`.
    ///
    /// Call only after the block built from this range has been committed.
    pub fn remove_range(&mut self, first: usize, last: usize) -> Result<Vec<Transaction>> {
        self.check_range(first, last)?;
        Ok(self.transactions.drain(first..=last).collect())
    }

    /// Drop every pending transaction that appears in `committed`.
    ///
    /// Used by peers when a block drafted elsewhere is committed. Returns the
    /// number of entries removed.
    pub fn remove_committed(&mut self, committed: &[Transaction]) -> usize {
        let hashes: HashSet<Hash> = committed.iter().map(Transaction::hash).collect();
        let before = self.transactions.len();
        self.transactions.retain(|tx| !hashes.contains(&tx.hash()));
        before - self.transactions.len()
    }

    /// Recompute the merkle root over the local range and compare with a claim.
    ///
    /// An out-of-range request votes `No`.
    pub fn verify_range(&self, merkle_root_claim: &Hash, first: usize, last: usize) -> Vote {
        match self.slice(first, last) {
            Ok(range) => verify_txs_from_merkle_root(merkle_root_claim, range),
            Err(_) => Vote::No,
        }
    }

    /// Clear all pending transactions.
    pub fn clear(&mut self) {
        self.transactions.clear();
    }

    /// Get pool statistics.
    pub fn stats(&self) -> MempoolStats {
        MempoolStats {
            total_transactions: self.len(),
            capacity: self.config.max_transactions,
        }
    }
}

impl Default for MempoolPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Mempool statistics.
#[derive(Debug, Clone)]
pub struct MempoolStats {
    /// Total number of pending transactions.
    pub total_transactions: usize,
    /// Pool capacity.
    pub capacity: usize,
}
