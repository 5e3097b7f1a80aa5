//! Validator runtime.
//!
//! A [`Validator`] owns one ledger copy, one mempool and one consensus
//! coordinator behind a single async mutex. Its run loop multiplexes three
//! event sources:
//!
//! - inbound transport messages, handled one at a time in arrival order
//! - a block-interval tick, on which the validator drafts and proposes a
//!   block if it is the generator for the next id
//! - cancellation
//!
//! Vote collection happens outside the lock, so a generator keeps serving
//! its peers while a round is open.

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use pkchain_chain::{seal_draft, Ledger, LedgerError, MempoolConfig, MempoolPool};
use pkchain_consensus::{
    ConsensusCoordinator, ConsensusError, PeerVote, Proposal, Vote, VoteRecord,
};
use pkchain_core::{Block, BlockId, Hash, Transaction};
use pkchain_net::{
    certificate_names, CancellationToken, CertificateDer, Discovery, InboundMessage, Message,
    PeerClient, PeerInfo, TlsCredentials, TransportConfig, TransportListener, VoteReply,
};
use pkchain_storage::{ChainStore, Storage};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Mutable validator state. Only ever touched through the validator's lock.
pub struct NodeState {
    pub ledger: Ledger,
    pub pool: MempoolPool,
    pub coordinator: ConsensusCoordinator,
    store: Option<ChainStore>,
}

impl NodeState {
    /// Append an accepted block and persist it.
    ///
    /// A storage failure is logged; the in-memory ledger stays authoritative.
    fn commit(&mut self, block: Block, proof: Hash) -> Result<BlockId> {
        let id = self.ledger.add_block(block, proof)?;
        if let Some(store) = &self.store {
            if let Err(e) = store.append_block(self.ledger.last_block()) {
                error!(block_id = id, error = %e, "failed to persist block");
            }
        }
        Ok(id)
    }

    /// Commit a block drafted elsewhere and drop its transactions from the pool.
    ///
    /// The block must name the round-robin generator for its id.
    fn commit_remote(&mut self, block: Block) -> Result<BlockId> {
        let expected = self.coordinator.expected_generator(block.id)?;
        if block.generator_address != expected {
            return Err(ConsensusError::NotGenerator {
                expected: expected.to_string(),
                got: block.generator_address,
            }
            .into());
        }
        let proof = block.generation_proof.ok_or(LedgerError::InvalidProof)?;
        let id = self.commit(block, proof)?;
        let removed = self
            .pool
            .remove_committed(&self.ledger.last_block().transactions);
        debug!(block_id = id, removed, "pool pruned after remote block");
        Ok(id)
    }
}

struct Inner {
    config: NodeConfig,
    discovery: Discovery,
    peers: Vec<PeerInfo>,
    credentials: TlsCredentials,
    client: PeerClient,
    state: Mutex<NodeState>,
}

/// One validator. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Validator {
    inner: Arc<Inner>,
}

impl Validator {
    /// Build a validator from already loaded discovery and credentials.
    ///
    /// With a data directory the stored chain is replayed into the ledger.
    pub fn new(config: NodeConfig, credentials: TlsCredentials, discovery: Discovery) -> Result<Self> {
        config.validate()?;
        if discovery.find(&config.name).is_none() {
            return Err(NodeError::UnknownValidator(config.name.clone()));
        }

        let (ledger, store) = match &config.data_dir {
            Some(dir) => {
                let store = ChainStore::new(Storage::open(dir)?);
                if !store.is_initialized()? {
                    store.init_genesis(&Block::genesis())?;
                }
                let ledger = Ledger::from_blocks(store.load_chain()?, config.difficulty)?;
                info!(data_dir = %dir.display(), height = ledger.height(), "loaded stored chain");
                (ledger, Some(store))
            }
            None => (Ledger::with_difficulty(config.difficulty)?, None),
        };

        let pool = MempoolPool::with_config(MempoolConfig {
            max_transactions: config.max_pending_transactions,
        });
        let coordinator = ConsensusCoordinator::new(discovery.validators(), config.quorum());
        let client = PeerClient::new(config.transport.clone(), &credentials)?;
        let peers = discovery.peers_excluding(&config.name);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                discovery,
                peers,
                credentials,
                client,
                state: Mutex::new(NodeState {
                    ledger,
                    pool,
                    coordinator,
                    store,
                }),
            }),
        })
    }

    /// Load discovery file and credentials named by `config`, then build.
    pub fn from_config(config: NodeConfig) -> Result<Self> {
        let discovery = config.load_discovery()?;
        let credentials = config.load_credentials()?;
        Self::new(config, credentials, discovery)
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Every other validator in the discovery file.
    pub fn peers(&self) -> &[PeerInfo] {
        &self.inner.peers
    }

    pub async fn state(&self) -> MutexGuard<'_, NodeState> {
        self.inner.state.lock().await
    }

    pub async fn height(&self) -> BlockId {
        self.state().await.ledger.height()
    }

    pub async fn pending(&self) -> usize {
        self.state().await.pool.len()
    }

    /// A copy of the current ledger.
    pub async fn ledger(&self) -> Ledger {
        self.state().await.ledger.clone()
    }

    /// Serve peers and take part in consensus until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let listen = self.inner.config.listen_addr(&self.inner.discovery)?;
        let transport = TransportConfig {
            bind_addr: listen,
            ..self.inner.config.transport.clone()
        };
        let mut handle = TransportListener::new(transport, &self.inner.credentials)?
            .start(shutdown.child_token())
            .await?;
        if handle.local_addr.port() != listen.port() {
            warn!(
                listed = listen.port(),
                bound = handle.local_addr.port(),
                "listening on a port other than the discovery entry; peers cannot reach this validator"
            );
        }
        info!(name = %self.name(), addr = %handle.local_addr, peers = self.inner.peers.len(), "validator started");

        self.catch_up().await;

        let mut ticker = tokio::time::interval(self.inner.config.block_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut round: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                inbound = handle.inbound_rx.recv() => match inbound {
                    Some(inbound) => self.handle_inbound(inbound).await,
                    None => {
                        warn!("transport stopped delivering messages");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if round.as_ref().map_or(true, JoinHandle::is_finished) {
                        let this = self.clone();
                        round = Some(tokio::spawn(async move {
                            if let Err(e) = this.try_generate().await {
                                warn!(error = %e, "generation round failed");
                            }
                        }));
                    }
                }
            }
        }

        if let Some(round) = round {
            round.abort();
        }
        handle.stop().await;
        if let Some(store) = &self.state().await.store {
            store.flush()?;
        }
        info!(name = %self.name(), "validator stopped");
        Ok(())
    }

    async fn handle_inbound(&self, inbound: InboundMessage) {
        let InboundMessage {
            message,
            from,
            peer_cert,
            responder,
        } = inbound;

        match message {
            Message::Transaction(tx) => {
                let hash = tx.hash();
                match self.queue_transaction(tx).await {
                    Ok(()) => debug!(%hash, %from, "transaction queued"),
                    Err(e) => warn!(%hash, %from, error = %e, "transaction dropped"),
                }
            }
            Message::Proposal(proposal) => {
                let reply = self.vote_on(&proposal).await;
                if !responder.reply(Message::Vote(reply)) {
                    debug!(%from, "proposer went away before the vote was sent");
                }
            }
            Message::Block(block) => {
                let id = block.id;
                if let Err(e) = self.receive_block_from(block, peer_cert.as_ref()).await {
                    warn!(block_id = id, %from, error = %e, "rejected block");
                }
            }
            Message::ChainRequest { from_id } => {
                let blocks = self.state().await.ledger.blocks_from(from_id).to_vec();
                debug!(%from, from_id, count = blocks.len(), "serving chain request");
                responder.reply(Message::ChainResponse(blocks));
            }
            other @ (Message::Vote(_) | Message::ChainResponse(_)) => {
                debug!(%from, kind = %other.kind(), "ignoring unsolicited message");
            }
        }
    }

    /// Verify a peer's proposal against the local tip and mempool.
    pub async fn vote_on(&self, proposal: &Proposal) -> VoteReply {
        let state = self.state().await;
        let local_range = state.pool.slice(proposal.first, proposal.last).ok();
        let vote = state
            .coordinator
            .verify(proposal, state.ledger.last_block(), local_range);
        info!(
            block_id = proposal.draft.id,
            generator = %proposal.draft.generator_address,
            %vote,
            "voted on proposal"
        );
        VoteReply {
            block_hash: proposal.block_hash(),
            voter: self.name().to_string(),
            vote,
        }
    }

    /// Check and queue a transaction broadcast by a client.
    pub async fn queue_transaction(&self, tx: Transaction) -> Result<()> {
        if !tx.is_hash_valid() {
            return Err(NodeError::CorruptTransaction(tx.hash()));
        }
        tx.operation().validate()?;
        self.state().await.pool.add(tx)?;
        Ok(())
    }

    /// Accept a pushed block only from the validator that generated it, as
    /// named by the sender's TLS certificate.
    async fn receive_block_from(
        &self,
        block: Block,
        sender: Option<&CertificateDer<'_>>,
    ) -> Result<()> {
        let authentic = sender.is_some_and(|cert| certificate_names(cert, &block.generator_address));
        if !authentic {
            return Err(NodeError::UnauthenticatedBlock {
                block_id: block.id,
                generator: block.generator_address,
            });
        }
        self.receive_block(block).await;
        Ok(())
    }

    async fn receive_block(&self, block: Block) {
        let mut state = self.state().await;
        let height = state.ledger.height();

        if block.id <= height {
            debug!(block_id = block.id, height, "block already known");
            return;
        }
        if block.id > height + 1 {
            drop(state);
            info!(block_id = block.id, height, "behind the network, syncing");
            self.catch_up().await;
            return;
        }

        let id = block.id;
        match state.commit_remote(block) {
            Ok(_) => info!(block_id = id, "committed block from generator"),
            Err(e) => warn!(block_id = id, error = %e, "rejected block from generator"),
        }
    }

    /// Ask each peer for blocks past the local tip and append those that link
    /// and were drafted by the generator due for their id.
    pub async fn catch_up(&self) {
        for peer in &self.inner.peers {
            let from_id = self.height().await + 1;
            let reply = self
                .inner
                .client
                .request(peer, &Message::ChainRequest { from_id })
                .await;

            let blocks = match reply {
                Ok(Message::ChainResponse(blocks)) => blocks,
                Ok(other) => {
                    warn!(peer = %peer.name, kind = %other.kind(), "unexpected answer to chain request");
                    continue;
                }
                Err(e) => {
                    debug!(peer = %peer.name, error = %e, "chain request failed");
                    continue;
                }
            };

            let mut state = self.state().await;
            for block in blocks {
                if block.id <= state.ledger.height() {
                    continue;
                }
                let id = block.id;
                if let Err(e) = state.commit_remote(block) {
                    warn!(peer = %peer.name, block_id = id, error = %e, "stopped syncing");
                    break;
                }
            }
        }
    }

    /// Run one generation round if this validator drafts the next block.
    ///
    /// Returns the committed block id, or `None` when there was nothing to
    /// do or the round was rejected.
    pub async fn try_generate(&self) -> Result<Option<BlockId>> {
        let name = self.name();
        let (draft, last, difficulty) = {
            let state = self.state().await;
            let next = state.ledger.height() + 1;
            if state.pool.is_empty() || !state.coordinator.is_generator(name, next) {
                return Ok(None);
            }

            let last = state.pool.len().min(self.inner.config.max_block_transactions) - 1;
            let draft = state.ledger.draft_unsealed(&state.pool, 0, last, name)?;
            (draft, last, state.ledger.difficulty())
        };

        // The nonce search runs off the async workers and outside the lock.
        let draft = if difficulty > 0 {
            tokio::task::spawn_blocking(move || {
                let mut draft = draft;
                seal_draft(&mut draft, difficulty).map(|_| draft)
            })
            .await??
        } else {
            draft
        };

        let proposal = {
            let mut guard = self.state().await;
            let NodeState {
                ledger,
                pool,
                coordinator,
                ..
            } = &mut *guard;

            if ledger.last_block().hash() != draft.previous_hash {
                debug!(block_id = draft.id, "tip moved while sealing, draft dropped");
                return Ok(None);
            }
            coordinator.propose(name, draft, 0, last, pool.slice(0, last)?)?
        };

        let votes = self.collect_votes(&proposal).await;

        let mut state = self.state().await;
        let outcome = state.coordinator.tally(&votes);
        state.coordinator.conclude();
        let proof = match outcome {
            Ok(proof) => proof,
            Err(e) => {
                info!(block_id = proposal.draft.id, reason = %e, "draft discarded");
                return Ok(None);
            }
        };

        let id = state.commit(proposal.draft, proof)?;
        state.pool.remove_range(proposal.first, proposal.last)?;
        let committed = state.ledger.last_block().clone();
        drop(state);

        let failures = self
            .inner
            .client
            .broadcast(&self.inner.peers, &Message::Block(committed))
            .await;
        if !failures.is_empty() {
            warn!(block_id = id, failed = failures.len(), "block not delivered to every peer");
        }
        Ok(Some(id))
    }

    /// Put `proposal` to every peer concurrently, each bounded by the vote timeout.
    async fn collect_votes(&self, proposal: &Proposal) -> Vec<VoteRecord> {
        let timeout = self.inner.config.vote_timeout();
        let expected = proposal.block_hash();
        let message = Message::Proposal(proposal.clone());

        let mut tasks = JoinSet::new();
        for peer in self.inner.peers.iter().cloned() {
            let client = self.inner.client.clone();
            let message = message.clone();
            tasks.spawn(async move {
                let vote = match tokio::time::timeout(timeout, client.request(&peer, &message)).await {
                    Err(_) => PeerVote::TimedOut,
                    Ok(Ok(Message::Vote(reply))) if reply.block_hash == expected => {
                        PeerVote::Cast(reply.vote)
                    }
                    Ok(Ok(other)) => {
                        warn!(peer = %peer.name, kind = %other.kind(), "unexpected answer to proposal");
                        PeerVote::Cast(Vote::No)
                    }
                    Ok(Err(e)) if e.is_unreachable() => PeerVote::Unreachable,
                    Ok(Err(e)) => {
                        debug!(peer = %peer.name, error = %e, "no vote received");
                        PeerVote::TimedOut
                    }
                };
                VoteRecord::new(peer.name, vote)
            });
        }

        let mut votes = Vec::with_capacity(self.inner.peers.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(record) => votes.push(record),
                Err(e) => error!("vote task failed: {}", e),
            }
        }
        votes
    }
}
