//! Error types for the validator transport.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors that can occur in the transport layer.
#[derive(Error, Debug)]
pub enum NetError {
    /// Transport-level I/O error.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration error.
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    /// Failed to encode or decode an envelope payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// The envelope names a message kind this node does not know.
    #[error("unknown message kind: {0}")]
    UnknownKind(u8),

    /// The envelope was produced by an incompatible encoder.
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    /// Frame exceeds the maximum allowed size.
    #[error("message too large: {size} bytes (max {max} bytes)")]
    MessageTooLarge {
        /// Actual frame size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The connection ended inside a frame.
    #[error("connection closed mid-frame")]
    Truncated,

    /// The peer could not be reached (refused, reset, or connect timeout).
    #[error("peer {peer} unavailable: {reason}")]
    NetworkUnavailable { peer: String, reason: String },

    /// An operation on an established connection timed out.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    /// The peer closed the connection instead of answering a request.
    #[error("peer {0} closed the connection without replying")]
    NoReply(String),

    /// No free port was found after the configured number of bind attempts.
    #[error("address {addr} in use after {attempts} bind attempts")]
    AddressInUse { addr: SocketAddr, attempts: u32 },

    /// Certificate or key material could not be loaded.
    #[error("credentials error: {0}")]
    Credentials(String),

    /// A peer name cannot be used as a TLS server name.
    #[error("invalid server name: {0}")]
    InvalidServerName(String),

    /// A discovery file line could not be parsed.
    #[error("discovery file line {line}: {reason}")]
    Discovery { line: usize, reason: String },

    /// The peer is not listed in the discovery file.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),
}

impl NetError {
    /// Whether the failure means the peer was never reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::NetworkUnavailable { .. })
    }
}

/// Convenience result type for transport operations.
pub type Result<T> = std::result::Result<T, NetError>;
