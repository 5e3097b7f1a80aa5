//! Merkle-root voting consensus for pkchain.
//!
//! This crate provides the agreement protocol run by the permissioned
//! validator set:
//! - Round-robin generator selection over the ordered validator set
//! - Independent verification of a proposed merkle root against a local mempool range
//! - The propose → verify → accept/reject round state machine and its quorum rule
//!
//! # Example
//!
//! ```rust,no_run
//! use pkchain_consensus::{ConsensusCoordinator, QuorumPolicy, PeerVote, Vote, VoteRecord};
//! use pkchain_core::{Block, Operation, OperationResult, Transaction};
//!
//! let validators = vec!["alpha".to_string(), "beta".to_string()];
//! let mut coordinator = ConsensusCoordinator::new(validators, QuorumPolicy::default());
//!
//! let pool = vec![Transaction::new(
//!     "client",
//!     Operation::Query { name: "alice".into() },
//!     OperationResult::failure("Name not found."),
//! )];
//!
//! // Block 1 belongs to "beta" under round-robin.
//! let draft = Block::draft(&Block::genesis(), pool.clone(), "beta").unwrap();
//! coordinator.propose("beta", draft, 0, 0, &pool).unwrap();
//!
//! let proof = coordinator
//!     .tally(&[VoteRecord::new("alpha", PeerVote::Cast(Vote::Yes))])
//!     .unwrap();
//! coordinator.conclude();
//! ```

pub mod coordinator;
pub mod selection;
pub mod verify;

// Re-export commonly used types
pub use coordinator::{
    ConsensusCoordinator, ConsensusError, Proposal, QuorumPolicy, RoundState, Tally, VoteSource,
};
pub use selection::{FixedGenerator, GeneratorSelector, RoundRobin};
pub use verify::{verify_txs_from_merkle_root, PeerVote, Vote, VoteRecord};
