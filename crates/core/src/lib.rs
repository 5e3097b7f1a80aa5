//! Core ledger primitives for pkchain.
//!
//! This crate provides the fundamental types used throughout the ledger:
//! - SHA-256 hashing and the canonical encoding hashed by blocks and transactions
//! - PKI transactions (register, query, validate, update, revoke)
//! - Blocks and the hash chain linkage
//! - Merkle roots over transaction hashes

pub mod block;
pub mod encoding;
pub mod hash;
pub mod merkle;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use block::{Block, BlockId, BlockStatus, BLOCK_VERSION};
pub use encoding::CanonicalEncoder;
pub use hash::{hash, hash_concat, Hash, H256, MAX_DIFFICULTY};
pub use merkle::{combine, leaf_hashes, merkle_root, transactions_root, MerkleError};
pub use transaction::{
    InputError, Operation, OperationKind, OperationResult, Transaction, TransactionType,
};
