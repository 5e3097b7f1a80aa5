//! Mutually-authenticated TCP transport.
//!
//! [`TransportListener`] accepts TLS connections from peers holding a
//! certificate issued by a trusted authority, reads framed [`Message`]s, and
//! hands each one to the node over a channel together with a [`Responder`].
//! A reply sent through the responder is written back on the same
//! connection, which is how proposals are answered with votes and chain
//! requests with blocks.
//!
//! [`PeerClient`] is the outbound side: one-shot sends, request/response
//! exchanges, and broadcasts to a set of peers.

use crate::config::{TransportConfig, RETRY_PORT_MAX, RETRY_PORT_MIN};
use crate::discovery::PeerInfo;
use crate::error::{NetError, Result};
use crate::message::{read_envelope, read_frame, write_frame, Message};
use crate::tls::{certificate_names, server_name, TlsCredentials};
use rand::Rng;
use rustls::pki_types::CertificateDer;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sends at most one reply back on the connection a message arrived on.
#[derive(Debug)]
pub struct Responder {
    tx: oneshot::Sender<Message>,
}

impl Responder {
    /// Queue `reply` for the peer. Returns `false` if the connection is gone.
    pub fn reply(self, reply: Message) -> bool {
        self.tx.send(reply).is_ok()
    }
}

/// A received message together with where it came from.
#[derive(Debug)]
pub struct InboundMessage {
    /// The decoded message.
    pub message: Message,
    /// The remote socket address that sent it.
    pub from: SocketAddr,
    /// End-entity certificate the peer authenticated with.
    pub peer_cert: Option<CertificateDer<'static>>,
    /// Dropping it without replying lets the connection move on.
    pub responder: Responder,
}

impl InboundMessage {
    /// Whether the sender's TLS certificate was issued for `name`.
    pub fn is_from(&self, name: &str) -> bool {
        self.peer_cert
            .as_ref()
            .is_some_and(|cert| certificate_names(cert, name))
    }
}

/// Handle returned by [`TransportListener::start`] to control the listener.
pub struct TransportHandle {
    /// Channel that delivers every inbound message to the node.
    pub inbound_rx: mpsc::Receiver<InboundMessage>,
    /// The local address the listener is bound to.
    pub local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl TransportHandle {
    /// Stop accepting and close every open connection.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Stop the listener and wait for the accept loop to exit.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!("transport accept loop panicked: {}", e);
        }
    }
}

/// Listens for inbound TLS connections and delivers decoded messages.
pub struct TransportListener {
    config: TransportConfig,
    acceptor: TlsAcceptor,
}

impl TransportListener {
    /// Create a listener that authenticates peers with `credentials`.
    pub fn new(config: TransportConfig, credentials: &TlsCredentials) -> Result<Self> {
        Ok(Self {
            config,
            acceptor: credentials.acceptor()?,
        })
    }

    /// Bind the configured address, moving to a random port in
    /// `1500..5000` whenever the address is already in use.
    pub async fn bind(&self) -> Result<TcpListener> {
        let mut addr = self.config.bind_addr;
        let attempts = self.config.bind_attempts.max(1);

        for attempt in 1..=attempts {
            match TcpListener::bind(addr).await {
                Ok(listener) => return Ok(listener),
                Err(e) if e.kind() == ErrorKind::AddrInUse && attempt < attempts => {
                    let port = rand::thread_rng().gen_range(RETRY_PORT_MIN..RETRY_PORT_MAX);
                    warn!(
                        "address {} is already in use, trying port {} instead",
                        addr, port
                    );
                    addr.set_port(port);
                }
                Err(e) if e.kind() == ErrorKind::AddrInUse => {
                    return Err(NetError::AddressInUse { addr, attempts });
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(NetError::AddressInUse { addr, attempts })
    }

    /// Bind and start accepting connections.
    ///
    /// The accept loop runs until `shutdown` is cancelled. Each connection is
    /// handled on its own task, at most `max_connections` at a time.
    pub async fn start(self, shutdown: CancellationToken) -> Result<TransportHandle> {
        let listener = self.bind().await?;
        let local_addr = listener.local_addr()?;
        info!("transport listening on {}", local_addr);

        let (tx, rx) = mpsc::channel::<InboundMessage>(self.config.channel_buffer_size);
        let config = Arc::new(self.config);
        let acceptor = self.acceptor;
        let permits = Arc::new(Semaphore::new(config.max_connections.max(1)));
        let token = shutdown.clone();

        let task = tokio::spawn(async move {
            loop {
                let permit = tokio::select! {
                    _ = token.cancelled() => break,
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let (stream, addr) = tokio::select! {
                    _ = token.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("accept error: {}", e);
                            continue;
                        }
                    },
                };

                debug!("accepted connection from {}", addr);
                let acceptor = acceptor.clone();
                let tx = tx.clone();
                let config = config.clone();
                let token = token.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = handle_connection(stream, addr, acceptor, tx, &config, token).await {
                        warn!("connection from {} dropped: {}", addr, e);
                    }
                });
            }
            info!("transport listener on {} stopped", local_addr);
        });

        Ok(TransportHandle {
            inbound_rx: rx,
            local_addr,
            shutdown,
            task,
        })
    }
}

/// Complete the TLS handshake, then read frames until EOF, error, or shutdown.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    acceptor: TlsAcceptor,
    tx: mpsc::Sender<InboundMessage>,
    config: &TransportConfig,
    token: CancellationToken,
) -> Result<()> {
    let io_timeout = config.io_timeout();
    let mut tls = timeout(io_timeout, acceptor.accept(stream))
        .await
        .map_err(|_| NetError::Timeout(config.io_timeout_ms))??;
    let peer_cert = tls
        .get_ref()
        .1
        .peer_certificates()
        .and_then(|chain| chain.first())
        .cloned();

    loop {
        let envelope = tokio::select! {
            _ = token.cancelled() => break,
            read = timeout(io_timeout, read_envelope(&mut tls, config.max_message_size)) => {
                match read {
                    Ok(result) => result?,
                    Err(_) => {
                        debug!("connection from {} idle, closing", addr);
                        break;
                    }
                }
            }
        };
        let Some(envelope) = envelope else { break };

        let message = match Message::decode(&envelope) {
            Ok(message) => message,
            Err(e) => {
                // Framing is intact, so skip the message and keep reading.
                warn!("undecodable envelope from {}: {}", addr, e);
                continue;
            }
        };

        debug!("received {} from {}", message.kind(), addr);
        let (reply_tx, reply_rx) = oneshot::channel();
        let inbound = InboundMessage {
            message,
            from: addr,
            peer_cert: peer_cert.clone(),
            responder: Responder { tx: reply_tx },
        };
        if tx.send(inbound).await.is_err() {
            info!("inbound channel closed, stopping reader for {}", addr);
            break;
        }

        match timeout(io_timeout, reply_rx).await {
            Ok(Ok(reply)) => {
                timeout(io_timeout, write_frame(&mut tls, &reply, config.max_message_size))
                    .await
                    .map_err(|_| NetError::Timeout(config.io_timeout_ms))??;
            }
            Ok(Err(_)) => {}
            Err(_) => warn!("no reply produced for {} within {}ms", addr, config.io_timeout_ms),
        }
    }

    let _ = tls.shutdown().await;
    debug!("connection to {} closed", addr);
    Ok(())
}

// ── Outbound ────────────────────────────────────────────────────────────────

/// An open, authenticated connection to one peer.
pub struct PeerConnection {
    stream: TlsStream<TcpStream>,
    peer: String,
    max_message_size: usize,
    io_timeout_ms: u64,
}

impl PeerConnection {
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Write one message.
    pub async fn send(&mut self, msg: &Message) -> Result<()> {
        let frame = msg.encode_framed(self.max_message_size)?;
        self.send_frame(&frame).await
    }

    /// Write an already framed message.
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        let ms = self.io_timeout_ms;
        let write = async {
            self.stream.write_all(frame).await?;
            self.stream.flush().await
        };
        timeout(Duration::from_millis(ms), write)
            .await
            .map_err(|_| NetError::Timeout(ms))?
            .map_err(NetError::from)
    }

    /// Read the next message, `None` once the peer has closed.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        let max = self.max_message_size;
        let ms = self.io_timeout_ms;
        timeout(Duration::from_millis(ms), read_frame(&mut self.stream, max))
            .await
            .map_err(|_| NetError::Timeout(ms))?
    }

    /// Send `msg` and wait for the reply on the same connection.
    pub async fn request(&mut self, msg: &Message) -> Result<Message> {
        self.send(msg).await?;
        match self.recv().await? {
            Some(reply) => Ok(reply),
            None => Err(NetError::NoReply(self.peer.clone())),
        }
    }

    /// Close the connection with a TLS close_notify.
    pub async fn close(mut self) -> Result<()> {
        let ms = self.io_timeout_ms;
        timeout(Duration::from_millis(ms), self.stream.shutdown())
            .await
            .map_err(|_| NetError::Timeout(ms))?
            .map_err(NetError::from)
    }
}

/// Outbound side of the transport.
#[derive(Clone)]
pub struct PeerClient {
    config: TransportConfig,
    connector: TlsConnector,
}

impl PeerClient {
    /// Create a client presenting `credentials` to peers.
    pub fn new(config: TransportConfig, credentials: &TlsCredentials) -> Result<Self> {
        Ok(Self {
            config,
            connector: credentials.connector()?,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Connect to `peer` and complete the TLS handshake.
    ///
    /// Refused, reset and timed-out connections all surface as
    /// [`NetError::NetworkUnavailable`].
    pub async fn connect(&self, peer: &PeerInfo) -> Result<PeerConnection> {
        let name = server_name(&peer.name)?;
        let addr = peer.addr();
        let unavailable = |reason: String| NetError::NetworkUnavailable {
            peer: peer.name.clone(),
            reason,
        };

        let handshake = async {
            let tcp = TcpStream::connect(addr).await?;
            tcp.set_nodelay(true)?;
            self.connector.connect(name, tcp).await
        };
        let stream = timeout(self.config.connect_timeout(), handshake)
            .await
            .map_err(|_| unavailable(format!("connect timed out after {}ms", self.config.connect_timeout_ms)))?
            .map_err(|e| unavailable(e.to_string()))?;

        debug!(peer = %peer.name, %addr, "connected");
        Ok(PeerConnection {
            stream,
            peer: peer.name.clone(),
            max_message_size: self.config.max_message_size,
            io_timeout_ms: self.config.io_timeout_ms,
        })
    }

    /// Deliver one message to `peer` and close the connection.
    pub async fn send(&self, peer: &PeerInfo, msg: &Message) -> Result<()> {
        let frame = msg.encode_framed(self.config.max_message_size)?;
        let mut conn = self.connect(peer).await?;
        conn.send_frame(&frame).await?;
        conn.close().await
    }

    /// Send `msg` to `peer` and wait for its reply.
    pub async fn request(&self, peer: &PeerInfo, msg: &Message) -> Result<Message> {
        let mut conn = self.connect(peer).await?;
        let reply = conn.request(msg).await?;
        let _ = conn.close().await;
        Ok(reply)
    }

    /// Send `msg` to every peer concurrently.
    ///
    /// Returns the peers that could not be served; one failure never stops
    /// delivery to the others.
    pub async fn broadcast(&self, peers: &[PeerInfo], msg: &Message) -> Vec<(String, NetError)> {
        let mut tasks = JoinSet::new();
        for peer in peers.iter().cloned() {
            let client = self.clone();
            let msg = msg.clone();
            tasks.spawn(async move {
                let result = client.send(&peer, &msg).await;
                (peer.name, result)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((peer, Err(e))) => {
                    warn!(%peer, error = %e, "broadcast delivery failed");
                    failures.push((peer, e));
                }
                Err(e) => error!("broadcast task failed: {}", e),
            }
        }
        failures
    }
}
