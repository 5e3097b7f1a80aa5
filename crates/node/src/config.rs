//! Validator and client configuration.
//!
//! One JSON file describes a participant: its identity, where the discovery
//! file and TLS material live, and the consensus and transport tunables.
//! Every field except `name` has a default.

use crate::error::{NodeError, Result};
use pkchain_consensus::QuorumPolicy;
use pkchain_core::MAX_DIFFICULTY;
use pkchain_net::{Discovery, TlsCredentials, TransportConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identity of this participant. For a validator it must match a
    /// discovery-file hostname and the name its certificate was issued for.
    pub name: String,

    /// Path to the `<hostname> <ip> <port>` discovery file.
    pub discovery_file: PathBuf,

    /// PEM certificate chain presented to peers.
    pub cert_path: PathBuf,

    /// PEM private key for `cert_path`.
    pub key_path: PathBuf,

    /// Directory of trusted peer authority certificates.
    pub trusted_dir: PathBuf,

    /// Where confirmed blocks are persisted. In-memory only when unset.
    pub data_dir: Option<PathBuf>,

    /// Leading zero hex digits required of a generation proof.
    pub difficulty: usize,

    /// Minimum number of `Yes` votes a round needs.
    pub min_respondents: usize,

    /// How long the generator waits for each peer's vote (ms).
    pub vote_timeout_ms: u64,

    /// How often a validator checks whether it should draft a block (ms).
    pub block_interval_ms: u64,

    /// Upper bound on transactions drafted into one block.
    pub max_block_transactions: usize,

    /// Upper bound on pending transactions.
    pub max_pending_transactions: usize,

    pub transport: TransportConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            discovery_file: PathBuf::from("discovery.txt"),
            cert_path: PathBuf::from("certs/cert.pem"),
            key_path: PathBuf::from("certs/key.pem"),
            trusted_dir: PathBuf::from("certs/trusted"),
            data_dir: None,
            difficulty: 0,
            min_respondents: 1,
            vote_timeout_ms: 3_000,
            block_interval_ms: 2_000,
            max_block_transactions: 100,
            max_pending_transactions: 10_000,
            transport: TransportConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Read and check a JSON config file.
    ///
    /// Relative paths inside the file are resolved against the file's
    /// directory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| NodeError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&raw)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(NodeError::Config("name must not be empty".into()));
        }
        if self.max_block_transactions == 0 {
            return Err(NodeError::Config(
                "max_block_transactions must be at least 1".into(),
            ));
        }
        if self.block_interval_ms == 0 {
            return Err(NodeError::Config("block_interval_ms must be non-zero".into()));
        }
        if self.difficulty > MAX_DIFFICULTY {
            return Err(NodeError::Config(format!(
                "difficulty {} exceeds the maximum of {}",
                self.difficulty, MAX_DIFFICULTY
            )));
        }
        Ok(())
    }

    fn rebase(&mut self, base: &Path) {
        for path in [
            &mut self.discovery_file,
            &mut self.cert_path,
            &mut self.key_path,
            &mut self.trusted_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        if let Some(dir) = self.data_dir.as_mut().filter(|d| d.is_relative()) {
            *dir = base.join(&*dir);
        }
    }

    pub fn load_discovery(&self) -> Result<Discovery> {
        Ok(Discovery::load(&self.discovery_file)?)
    }

    pub fn load_credentials(&self) -> Result<TlsCredentials> {
        Ok(TlsCredentials::load(
            &self.cert_path,
            &self.key_path,
            &self.trusted_dir,
        )?)
    }

    pub fn quorum(&self) -> QuorumPolicy {
        QuorumPolicy::new(self.min_respondents)
    }

    /// Listener address: the configured interface on the port the discovery
    /// file lists for this validator.
    pub fn listen_addr(&self, discovery: &Discovery) -> Result<SocketAddr> {
        let me = discovery
            .find(&self.name)
            .ok_or_else(|| NodeError::UnknownValidator(self.name.clone()))?;
        Ok(SocketAddr::new(self.transport.bind_addr.ip(), me.port))
    }

    pub fn vote_timeout(&self) -> Duration {
        Duration::from_millis(self.vote_timeout_ms)
    }

    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.block_interval_ms)
    }
}
