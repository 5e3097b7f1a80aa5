//! Error types for the validator runtime and client.

use pkchain_chain::{LedgerError, MempoolError};
use pkchain_consensus::ConsensusError;
use pkchain_core::{BlockId, Hash, InputError};
use pkchain_net::NetError;
use pkchain_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} is not listed in the discovery file")]
    UnknownValidator(String),

    #[error("no validator answered the chain request")]
    NoValidatorReachable,

    #[error("unexpected reply from {peer}: expected {expected}, got {got}")]
    UnexpectedReply {
        peer: String,
        expected: &'static str,
        got: String,
    },

    #[error("transport error: {0}")]
    Net(#[from] NetError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("mempool error: {0}")]
    Mempool(#[from] MempoolError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("malformed input: {0}")]
    Input(#[from] InputError),

    #[error("transaction {0} does not match its contents")]
    CorruptTransaction(Hash),

    #[error("block {block_id} was not sent by its generator {generator}")]
    UnauthenticatedBlock { block_id: BlockId, generator: String },

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, NodeError>;
