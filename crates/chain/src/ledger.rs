//! The append-only ledger.
//!
//! A ledger owns its own chain, starting at the fixed genesis block. It
//! validates every appended block, drives block generation through the
//! consensus coordinator, and keeps the name registry in step with the chain.

use crate::mempool::{MempoolError, MempoolPool};
use crate::registry::{self, Registry};
use pkchain_consensus::{ConsensusCoordinator, ConsensusError, VoteSource};
use pkchain_core::{
    Block, BlockId, BlockStatus, Hash, InputError, MerkleError, Operation, OperationResult,
    Transaction, MAX_DIFFICULTY,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during ledger operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("out-of-sequence block: expected id {expected}, got {got}")]
    InvalidSequence { expected: BlockId, got: BlockId },

    #[error("linkage mismatch: expected previous hash {expected}, got {got}")]
    LinkageMismatch { expected: Hash, got: Hash },

    #[error("invalid generation proof")]
    InvalidProof,

    #[error("block {0} transactions do not match its merkle hash")]
    MerkleMismatch(BlockId),

    #[error("difficulty {0} exceeds the maximum of {MAX_DIFFICULTY}")]
    InvalidDifficulty(usize),

    #[error("no nonce satisfies difficulty {0}")]
    NonceExhausted(usize),

    #[error("no pending transactions")]
    EmptyPool,

    #[error("stored chain does not start with the genesis block")]
    InvalidGenesis,

    #[error("mempool error: {0}")]
    Mempool(#[from] MempoolError),

    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// An owned, validated chain of blocks.
#[derive(Debug, Clone)]
pub struct Ledger {
    chain: Vec<Block>,
    /// Leading zero hex digits required of a generation proof.
    difficulty: usize,
    registry: Registry,
}

impl Ledger {
    /// Create a ledger holding only the genesis block, with difficulty 0.
    pub fn new() -> Self {
        Self {
            chain: vec![Block::genesis()],
            difficulty: 0,
            registry: Registry::new(),
        }
    }

    /// Create a ledger whose generation proofs need `difficulty` leading
    /// zero hex digits. Fails above [`MAX_DIFFICULTY`].
    pub fn with_difficulty(difficulty: usize) -> Result<Self> {
        if difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidDifficulty(difficulty));
        }
        Ok(Self {
            difficulty,
            ..Self::new()
        })
    }

    /// Rebuild a ledger from stored blocks, re-validating every link and proof.
    pub fn from_blocks(blocks: Vec<Block>, difficulty: usize) -> Result<Self> {
        let mut blocks = blocks.into_iter();
        let genesis = Block::genesis();
        match blocks.next() {
            Some(first) if first.compute_hash() == genesis.hash() => {}
            _ => return Err(LedgerError::InvalidGenesis),
        }

        let mut ledger = Self::with_difficulty(difficulty)?;
        for block in blocks {
            let proof = block.generation_proof.ok_or(LedgerError::InvalidProof)?;
            ledger.add_block(block, proof)?;
        }
        debug!(height = ledger.height(), "ledger replayed");
        Ok(ledger)
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// The chain tail. Never fails: the chain always holds genesis.
    pub fn last_block(&self) -> &Block {
        &self.chain[self.chain.len() - 1]
    }

    /// Id of the chain tail.
    pub fn height(&self) -> BlockId {
        self.last_block().id
    }

    /// Number of blocks, genesis included.
    pub fn block_count(&self) -> usize {
        self.chain.len()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.chain.get(usize::try_from(id).ok()?)
    }

    /// Blocks with id `from` onward.
    pub fn blocks_from(&self, from: BlockId) -> &[Block] {
        let start = usize::try_from(from)
            .unwrap_or(usize::MAX)
            .min(self.chain.len());
        &self.chain[start..]
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Resolve an operation against the committed bindings.
    pub fn resolve(&self, op: &Operation) -> OperationResult {
        self.registry.resolve(op)
    }

    /// Validate, resolve and wrap an operation into a transaction.
    pub fn build_transaction(
        &self,
        generator: &str,
        op: Operation,
    ) -> std::result::Result<Transaction, InputError> {
        registry::build_transaction(self, generator, op)
    }

    /// Append `candidate`, accepted with `generation_proof`.
    ///
    /// The candidate must carry the next id and extend the tail, and the
    /// proof must meet the difficulty and equal the candidate's recomputed hash.
    pub fn add_block(&mut self, mut candidate: Block, generation_proof: Hash) -> Result<BlockId> {
        let expected = self.height() + 1;
        if candidate.id != expected {
            return Err(LedgerError::InvalidSequence {
                expected,
                got: candidate.id,
            });
        }

        let tip = self.last_block().hash();
        if candidate.previous_hash != tip {
            return Err(LedgerError::LinkageMismatch {
                expected: tip,
                got: candidate.previous_hash,
            });
        }

        if !generation_proof.meets_difficulty(self.difficulty)
            || generation_proof != candidate.compute_hash()
        {
            return Err(LedgerError::InvalidProof);
        }

        if !candidate.verify_merkle_hash() {
            return Err(LedgerError::MerkleMismatch(candidate.id));
        }

        candidate.set_hash(generation_proof);
        candidate.generation_proof = Some(generation_proof);
        candidate.status = BlockStatus::Confirmed;
        self.registry.apply_block(&candidate);

        let id = candidate.id;
        info!(
            block_id = id,
            txs = candidate.transaction_count,
            hash = %generation_proof,
            "block appended"
        );
        self.chain.push(candidate);
        Ok(id)
    }

    /// Draft a block from `pool[first..=last]` on top of the tail, leaving
    /// the nonce at zero.
    pub fn draft_unsealed(
        &self,
        pool: &MempoolPool,
        first: usize,
        last: usize,
        generator: &str,
    ) -> Result<Block> {
        if pool.is_empty() {
            return Err(LedgerError::EmptyPool);
        }
        let range = pool.slice(first, last)?;
        Ok(Block::draft(self.last_block(), range.to_vec(), generator)?)
    }

    /// Draft a proposed block from `pool[first..=last]` on top of the tail.
    ///
    /// With a non-zero difficulty the draft is sealed so its hash meets it.
    pub fn draft_block(
        &self,
        pool: &MempoolPool,
        first: usize,
        last: usize,
        generator: &str,
    ) -> Result<Block> {
        let mut draft = self.draft_unsealed(pool, first, last, generator)?;
        if self.difficulty > 0 {
            seal_draft(&mut draft, self.difficulty)?;
        }
        Ok(draft)
    }

    /// Run one full generation round for `pool[first..=last]`.
    ///
    /// On acceptance the block is appended and the range leaves the pool. On
    /// rejection the draft is discarded and the pool is left untouched.
    pub fn mine(
        &mut self,
        pool: &mut MempoolPool,
        first: usize,
        last: usize,
        generator: &str,
        coordinator: &mut ConsensusCoordinator,
        votes: &mut impl VoteSource,
    ) -> Result<BlockId> {
        let draft = self.draft_block(pool, first, last, generator)?;
        let proposal = coordinator.propose(generator, draft, first, last, pool.slice(first, last)?)?;

        let outcome = coordinator.run_round(votes);
        coordinator.conclude();

        let proof = match outcome {
            Ok(proof) => proof,
            Err(e) => {
                warn!(block_id = proposal.draft.id, error = %e, "draft discarded");
                return Err(e.into());
            }
        };

        let id = self.add_block(proposal.draft, proof)?;
        pool.remove_range(first, last)?;
        Ok(id)
    }
}

/// Seal `draft` for `difficulty`, for callers that draft with
/// [`Ledger::draft_unsealed`] and search for the nonce elsewhere.
pub fn seal_draft(draft: &mut Block, difficulty: usize) -> Result<Hash> {
    draft
        .seal(difficulty)
        .ok_or(LedgerError::NonceExhausted(difficulty))
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
