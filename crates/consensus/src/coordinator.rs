//! Propose → verify → accept/reject cycle.
//!
//! The coordinator is a small state machine:
//!
//! ```text
//! Idle ──propose──► Proposed ──tally──► Accepted ─┐
//!  ▲                                └──► Rejected ─┤
//!  └──────────────────conclude────────────────────┘
//! ```
//!
//! Vote collection itself happens outside: in-process through a
//! [`VoteSource`], or over the network by the node, which then hands the
//! collected [`VoteRecord`]s to [`ConsensusCoordinator::tally`].

use crate::selection::{GeneratorSelector, RoundRobin};
use crate::verify::{verify_txs_from_merkle_root, PeerVote, Vote, VoteRecord};
use pkchain_core::{Block, BlockId, Hash, Transaction};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during consensus operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("no validators configured")]
    NoValidators,

    #[error("not this validator's turn (expected {expected}, got {got})")]
    NotGenerator { expected: String, got: String },

    #[error("a consensus round is already in progress ({0})")]
    RoundInProgress(RoundState),

    #[error("no consensus round in progress")]
    NoActiveRound,

    #[error("draft merkle hash does not match the generator's own mempool range")]
    MerkleMismatch,

    #[error("round rejected ({yes} yes, {no} no, {timed_out} timed out)")]
    Rejected {
        yes: usize,
        no: usize,
        timed_out: usize,
    },

    #[error("quorum not met ({yes} yes votes, {required} required)")]
    QuorumNotMet { yes: usize, required: usize },
}

pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Where the coordinator is in the round lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Idle,
    Proposed,
    Accepted,
    Rejected,
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Proposed => "proposed",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A drafted block together with the mempool range it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub draft: Block,
    /// First mempool index, inclusive.
    pub first: usize,
    /// Last mempool index, inclusive.
    pub last: usize,
}

impl Proposal {
    /// The merkle root the generator claims for the range.
    pub fn merkle_root(&self) -> Hash {
        self.draft.merkle_hash
    }

    /// The hash the block will carry once accepted.
    pub fn block_hash(&self) -> Hash {
        self.draft.compute_hash()
    }
}

/// Acceptance rule for a round.
///
/// Peers that could not be reached are left out. Among the rest, every peer
/// must answer `Yes` (a `No` or a timeout rejects the round), at least
/// `min_respondents` must have answered, and the `Yes` votes must be a strict
/// majority of the reachable peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumPolicy {
    pub min_respondents: usize,
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self { min_respondents: 1 }
    }
}

impl QuorumPolicy {
    pub fn new(min_respondents: usize) -> Self {
        Self { min_respondents }
    }

    /// Apply the rule to a tally.
    pub fn evaluate(&self, tally: &Tally) -> Result<()> {
        if tally.no > 0 || tally.timed_out > 0 {
            return Err(ConsensusError::Rejected {
                yes: tally.yes,
                no: tally.no,
                timed_out: tally.timed_out,
            });
        }

        let reachable = tally.reachable();
        let majority = if reachable == 0 { 0 } else { reachable / 2 + 1 };
        let required = self.min_respondents.max(majority);
        if tally.yes < required {
            return Err(ConsensusError::QuorumNotMet {
                yes: tally.yes,
                required,
            });
        }
        Ok(())
    }
}

/// Vote counts for one round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub yes: usize,
    pub no: usize,
    pub timed_out: usize,
    pub unreachable: usize,
}

impl Tally {
    pub fn from_votes(votes: &[VoteRecord]) -> Self {
        let mut tally = Self::default();
        for record in votes {
            match record.vote {
                PeerVote::Cast(Vote::Yes) => tally.yes += 1,
                PeerVote::Cast(Vote::No) => tally.no += 1,
                PeerVote::TimedOut => tally.timed_out += 1,
                PeerVote::Unreachable => tally.unreachable += 1,
            }
        }
        tally
    }

    /// Peers that were reachable this round.
    pub fn reachable(&self) -> usize {
        self.yes + self.no + self.timed_out
    }
}

/// Gathers peer votes for a proposal.
pub trait VoteSource {
    fn collect_votes(&mut self, proposal: &Proposal) -> Vec<VoteRecord>;
}

/// Drives rounds for one validator.
pub struct ConsensusCoordinator {
    validators: Vec<String>,
    selector: Box<dyn GeneratorSelector>,
    policy: QuorumPolicy,
    state: RoundState,
    active: Option<Proposal>,
}

impl ConsensusCoordinator {
    /// Create a coordinator over the ordered validator set, using round-robin selection.
    pub fn new(validators: Vec<String>, policy: QuorumPolicy) -> Self {
        Self {
            validators,
            selector: Box::new(RoundRobin),
            policy,
            state: RoundState::Idle,
            active: None,
        }
    }

    /// Replace the generator selection strategy.
    pub fn with_selector(mut self, selector: impl GeneratorSelector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    pub fn validators(&self) -> &[String] {
        &self.validators
    }

    pub fn policy(&self) -> &QuorumPolicy {
        &self.policy
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn active_proposal(&self) -> Option<&Proposal> {
        self.active.as_ref()
    }

    /// The validator expected to draft block `block_id`.
    pub fn expected_generator(&self, block_id: BlockId) -> Result<&str> {
        self.selector
            .select(&self.validators, block_id)
            .ok_or(ConsensusError::NoValidators)
    }

    /// Check whether `validator` drafts block `block_id`.
    pub fn is_generator(&self, validator: &str, block_id: BlockId) -> bool {
        self.expected_generator(block_id)
            .is_ok_and(|expected| expected == validator)
    }

    /// Open a round for `draft`, built by `generator` from mempool range `first..=last`.
    ///
    /// The generator's own range must reproduce the draft's merkle hash.
    pub fn propose(
        &mut self,
        generator: &str,
        draft: Block,
        first: usize,
        last: usize,
        local_range: &[Transaction],
    ) -> Result<Proposal> {
        if self.state != RoundState::Idle {
            return Err(ConsensusError::RoundInProgress(self.state));
        }

        let expected = self.expected_generator(draft.id)?;
        if expected != generator {
            return Err(ConsensusError::NotGenerator {
                expected: expected.to_string(),
                got: generator.to_string(),
            });
        }

        if !verify_txs_from_merkle_root(&draft.merkle_hash, local_range).is_yes() {
            return Err(ConsensusError::MerkleMismatch);
        }

        let proposal = Proposal { draft, first, last };
        info!(
            block_id = proposal.draft.id,
            first,
            last,
            merkle_root = %proposal.merkle_root(),
            "proposing block"
        );
        self.active = Some(proposal.clone());
        self.state = RoundState::Proposed;
        Ok(proposal)
    }

    /// Decide how this validator votes on a peer's proposal.
    ///
    /// `local_tip` is the local chain tail and `local_range` the same index
    /// range taken from the local mempool (`None` when out of range).
    pub fn verify(
        &self,
        proposal: &Proposal,
        local_tip: &Block,
        local_range: Option<&[Transaction]>,
    ) -> Vote {
        let draft = &proposal.draft;

        if draft.previous_hash != local_tip.hash() {
            debug!(block_id = draft.id, "proposal does not extend local tip");
            return Vote::No;
        }

        if draft.id != local_tip.id + 1 {
            debug!(
                block_id = draft.id,
                tip_id = local_tip.id,
                "proposal out of sequence"
            );
            return Vote::No;
        }

        if !self.is_generator(&draft.generator_address, draft.id) {
            debug!(
                block_id = draft.id,
                generator = %draft.generator_address,
                "proposal from unexpected generator"
            );
            return Vote::No;
        }

        let Some(range) = local_range else {
            debug!(
                first = proposal.first,
                last = proposal.last,
                "proposal range missing from local mempool"
            );
            return Vote::No;
        };

        if range.len() as u64 != draft.transaction_count {
            return Vote::No;
        }

        let vote = verify_txs_from_merkle_root(&proposal.merkle_root(), range);
        debug!(block_id = draft.id, %vote, "verified proposal");
        vote
    }

    /// Aggregate the votes for the active round.
    ///
    /// On acceptance returns the generation proof: the agreed block hash.
    pub fn tally(&mut self, votes: &[VoteRecord]) -> Result<Hash> {
        if self.state != RoundState::Proposed {
            return Err(ConsensusError::NoActiveRound);
        }
        let proposal = self.active.as_ref().ok_or(ConsensusError::NoActiveRound)?;

        let tally = Tally::from_votes(votes);
        match self.policy.evaluate(&tally) {
            Ok(()) => {
                let proof = proposal.block_hash();
                info!(
                    block_id = proposal.draft.id,
                    yes = tally.yes,
                    unreachable = tally.unreachable,
                    proof = %proof,
                    "round accepted"
                );
                self.state = RoundState::Accepted;
                Ok(proof)
            }
            Err(e) => {
                warn!(block_id = proposal.draft.id, error = %e, "round rejected");
                self.state = RoundState::Rejected;
                Err(e)
            }
        }
    }

    /// Collect votes from `source` for the active round and tally them.
    pub fn run_round(&mut self, source: &mut impl VoteSource) -> Result<Hash> {
        let proposal = self.active.clone().ok_or(ConsensusError::NoActiveRound)?;
        let votes = source.collect_votes(&proposal);
        self.tally(&votes)
    }

    /// Close the current round and return to `Idle`, reporting how it ended.
    pub fn conclude(&mut self) -> RoundState {
        let ended = self.state;
        self.state = RoundState::Idle;
        self.active = None;
        ended
    }
}

impl fmt::Debug for ConsensusCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsensusCoordinator")
            .field("validators", &self.validators)
            .field("policy", &self.policy)
            .field("state", &self.state)
            .finish()
    }
}
