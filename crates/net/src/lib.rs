//! Validator transport for pkchain.
//!
//! Validators talk over mutually-authenticated TLS: each listener requires a
//! client certificate issued by a trusted peer authority, and each outbound
//! connection verifies the listener against the same set. On top of TLS,
//! messages travel as length-prefixed, versioned envelopes, any number per
//! connection.
//!
//! - [`message`]: the envelope and framing
//! - [`discovery`]: the `<hostname> <ip> <port>` peer file
//! - [`tls`]: PEM credential loading and rustls configs
//! - [`transport`]: listener, peer client and broadcast

pub mod config;
pub mod discovery;
pub mod error;
pub mod message;
pub mod tls;
pub mod transport;

// Re-export commonly used types
pub use config::TransportConfig;
pub use discovery::{Discovery, PeerInfo};
pub use error::{NetError, Result};
pub use message::{read_frame, write_frame, Message, MessageKind, VoteReply, ENVELOPE_VERSION};
pub use tls::{certificate_names, server_name, TlsCredentials};
pub use transport::{
    InboundMessage, PeerClient, PeerConnection, Responder, TransportHandle, TransportListener,
};
pub use rustls::pki_types::CertificateDer;
pub use tokio_util::sync::CancellationToken;
