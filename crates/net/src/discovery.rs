//! Discovery file parsing.
//!
//! One validator per line: `<hostname> <ip> <port>`, space separated. Blank
//! lines and lines starting with `#` are ignored. The hostname is both the
//! validator's identity and the TLS server name its certificate is issued for.

use crate::error::{NetError, Result};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

/// One validator listed in the discovery file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub name: String,
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerInfo {
    pub fn new(name: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            ip: addr.ip(),
            port: addr.port(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

/// The ordered validator set, as listed in the discovery file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    entries: Vec<PeerInfo>,
}

impl Discovery {
    pub fn new(entries: Vec<PeerInfo>) -> Self {
        Self { entries }
    }

    /// Parse discovery file contents.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for (index, raw) in contents.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            let [name, ip, port] = fields.as_slice() else {
                return Err(NetError::Discovery {
                    line,
                    reason: format!("expected `<hostname> <ip> <port>`, got {} fields", fields.len()),
                });
            };

            let ip: IpAddr = ip.parse().map_err(|_| NetError::Discovery {
                line,
                reason: format!("invalid ip address `{ip}`"),
            })?;
            let port: u16 = port.parse().map_err(|_| NetError::Discovery {
                line,
                reason: format!("invalid port `{port}`"),
            })?;

            if !seen.insert(name.to_string()) {
                return Err(NetError::Discovery {
                    line,
                    reason: format!("duplicate validator `{name}`"),
                });
            }

            entries.push(PeerInfo {
                name: name.to_string(),
                ip,
                port,
            });
        }

        Ok(Self { entries })
    }

    /// Read and parse a discovery file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn entries(&self) -> &[PeerInfo] {
        &self.entries
    }

    /// Validator identities in file order, self included.
    pub fn validators(&self) -> Vec<String> {
        self.entries.iter().map(|p| p.name.clone()).collect()
    }

    /// Every listed validator except `self_name`.
    pub fn peers_excluding(&self, self_name: &str) -> Vec<PeerInfo> {
        self.entries
            .iter()
            .filter(|p| p.name != self_name)
            .cloned()
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<&PeerInfo> {
        self.entries.iter().find(|p| p.name == name)
    }
}
