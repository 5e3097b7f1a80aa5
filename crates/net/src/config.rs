//! Configuration for the validator transport.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Lowest port tried when the configured one is taken.
pub const RETRY_PORT_MIN: u16 = 1500;
/// Upper bound (exclusive) for retry ports.
pub const RETRY_PORT_MAX: u16 = 5000;

/// Transport limits and timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Local address to bind the listener on.
    /// Default: `0.0.0.0:4321`
    pub bind_addr: SocketAddr,

    /// Maximum size of a single envelope in bytes.
    pub max_message_size: usize,

    /// How long to wait for an outbound TCP connect plus TLS handshake (ms).
    pub connect_timeout_ms: u64,

    /// How long any single read, write or reply may take (ms).
    pub io_timeout_ms: u64,

    /// Maximum number of inbound connections handled at once.
    pub max_connections: usize,

    /// Size of the inbound message channel buffer.
    pub channel_buffer_size: usize,

    /// Total bind attempts, the first on `bind_addr` and the rest on random ports.
    pub bind_attempts: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 4321)),
            max_message_size: 4 * 1024 * 1024,
            connect_timeout_ms: 3_000,
            io_timeout_ms: 5_000,
            max_connections: 64,
            channel_buffer_size: 1024,
            bind_attempts: 8,
        }
    }
}

impl TransportConfig {
    /// Loopback config on an ephemeral port with short timeouts, for tests
    /// and local clusters.
    pub fn local() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            connect_timeout_ms: 1_000,
            io_timeout_ms: 2_000,
            max_connections: 16,
            channel_buffer_size: 64,
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}
