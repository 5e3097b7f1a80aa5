//! Ledger state for pkchain.
//!
//! This crate holds everything a validator mutates locally:
//! - **Ledger**: the append-only, hash-linked chain with block validation and generation
//! - **Mempool**: the FIFO pool of pending transactions consensus refers to by index
//! - **Registry**: name ↔ key bindings folded from committed transactions
//!
//! # Example
//!
//! ```rust,no_run
//! use pkchain_chain::{Ledger, MempoolPool};
//! use pkchain_consensus::{ConsensusCoordinator, PeerVote, Proposal, QuorumPolicy, Vote, VoteRecord, VoteSource};
//! use pkchain_core::Operation;
//!
//! struct Agree;
//! impl VoteSource for Agree {
//!     fn collect_votes(&mut self, _: &Proposal) -> Vec<VoteRecord> {
//!         vec![VoteRecord::new("peer", PeerVote::Cast(Vote::Yes))]
//!     }
//! }
//!
//! let mut ledger = Ledger::new();
//! let mut pool = MempoolPool::new();
//! let tx = ledger
//!     .build_transaction("client", Operation::Register {
//!         name: "alice".into(),
//!         public_key: "PK1".into(),
//!     })
//!     .unwrap();
//! pool.add(tx).unwrap();
//!
//! let mut coordinator = ConsensusCoordinator::new(vec!["v1".into()], QuorumPolicy::default());
//! ledger.mine(&mut pool, 0, 0, "v1", &mut coordinator, &mut Agree).unwrap();
//! ```

pub mod ledger;
pub mod mempool;
pub mod registry;

// Re-export commonly used types
pub use ledger::{seal_draft, Ledger, LedgerError};
pub use mempool::{MempoolConfig, MempoolError, MempoolPool, MempoolStats};
pub use registry::{build_transaction, Registry};
