//! Client side of the ledger: fetch a chain copy, build transactions, submit them.
//!
//! A client is not a validator. It resolves an operation against the chain
//! it fetched, seals the result into a transaction and broadcasts it to every
//! validator's mempool.

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use pkchain_chain::Ledger;
use pkchain_core::{Block, Operation, Transaction};
use pkchain_net::{Discovery, Message, NetError, PeerClient, PeerInfo, TlsCredentials, TransportConfig};
use tracing::{debug, info, warn};

/// Outcome of submitting one operation.
#[derive(Debug)]
pub struct Submission {
    pub transaction: Transaction,
    /// Validators that accepted delivery.
    pub delivered: usize,
    /// Validators that could not be reached, with the reason.
    pub failures: Vec<(String, NetError)>,
}

pub struct LedgerClient {
    name: String,
    difficulty: usize,
    client: PeerClient,
    validators: Vec<PeerInfo>,
}

impl LedgerClient {
    pub fn new(
        name: impl Into<String>,
        difficulty: usize,
        transport: TransportConfig,
        credentials: &TlsCredentials,
        discovery: &Discovery,
    ) -> Result<Self> {
        let name = name.into();
        Ok(Self {
            client: PeerClient::new(transport, credentials)?,
            validators: discovery.peers_excluding(&name),
            name,
            difficulty,
        })
    }

    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        Self::new(
            config.name.clone(),
            config.difficulty,
            config.transport.clone(),
            &config.load_credentials()?,
            &config.load_discovery()?,
        )
    }

    pub fn validators(&self) -> &[PeerInfo] {
        &self.validators
    }

    /// Confirmed blocks from the first validator that answers.
    pub async fn fetch_blocks(&self) -> Result<Vec<Block>> {
        let request = Message::ChainRequest { from_id: 0 };
        for peer in &self.validators {
            match self.client.request(peer, &request).await {
                Ok(Message::ChainResponse(blocks)) => {
                    debug!(peer = %peer.name, count = blocks.len(), "fetched chain");
                    return Ok(blocks);
                }
                Ok(other) => warn!(
                    peer = %peer.name,
                    error = %NodeError::UnexpectedReply {
                        peer: peer.name.clone(),
                        expected: "chain-response",
                        got: other.kind().to_string(),
                    },
                    "skipping validator"
                ),
                Err(e) => warn!(peer = %peer.name, error = %e, "chain request failed"),
            }
        }
        Err(NodeError::NoValidatorReachable)
    }

    /// A validated ledger copy rebuilt from a validator's chain.
    pub async fn fetch_ledger(&self) -> Result<Ledger> {
        let blocks = self.fetch_blocks().await?;
        Ok(Ledger::from_blocks(blocks, self.difficulty)?)
    }

    /// Resolve `op` against the current chain and send the transaction to
    /// every validator.
    pub async fn submit(&self, op: Operation) -> Result<Submission> {
        let ledger = self.fetch_ledger().await?;
        let transaction = ledger.build_transaction(&self.name, op)?;

        let failures = self
            .client
            .broadcast(&self.validators, &Message::Transaction(transaction.clone()))
            .await;
        let delivered = self.validators.len() - failures.len();
        info!(
            kind = %transaction.operation().kind(),
            hash = %transaction.hash(),
            success = transaction.result().success,
            delivered,
            "transaction submitted"
        );

        Ok(Submission {
            transaction,
            delivered,
            failures,
        })
    }
}
