//! Votes and independent verification of a proposed merkle root.
//!
//! A peer never trusts the generator's transactions: it pulls the same index
//! range from its own mempool, recomputes the root, and votes on the match.

use pkchain_core::{transactions_root, Hash, Transaction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A peer's answer to a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vote {
    Yes,
    No,
}

impl Vote {
    pub fn from_bool(agree: bool) -> Self {
        if agree {
            Self::Yes
        } else {
            Self::No
        }
    }

    pub fn is_yes(self) -> bool {
        self == Self::Yes
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => f.write_str("YES"),
            Self::No => f.write_str("NO"),
        }
    }
}

/// What the coordinator learned from one peer during a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerVote {
    /// The peer answered.
    Cast(Vote),
    /// The peer was connected but did not answer in time.
    TimedOut,
    /// The peer could not be reached at all.
    Unreachable,
}

/// One peer's vote, labelled with its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRecord {
    pub peer: String,
    pub vote: PeerVote,
}

impl VoteRecord {
    pub fn new(peer: impl Into<String>, vote: PeerVote) -> Self {
        Self {
            peer: peer.into(),
            vote,
        }
    }
}

/// Recompute the merkle root over `transactions` and compare with the claim.
///
/// Returns `Yes` iff the roots match exactly. An empty local range can never
/// match a claim.
pub fn verify_txs_from_merkle_root(merkle_root_claim: &Hash, transactions: &[Transaction]) -> Vote {
    match transactions_root(transactions) {
        Ok(root) => Vote::from_bool(root == *merkle_root_claim),
        Err(_) => Vote::No,
    }
}
