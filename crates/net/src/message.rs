//! Wire messages and framing.
//!
//! ## Wire format
//!
//! Every message on the wire is length-prefixed:
//!
//! ```text
//! [4 bytes: envelope length (u32-le)] [1 byte: kind] [1 byte: version] [N bytes: bincode payload]
//! ```
//!
//! A connection carries any number of frames. The reader validates the
//! length against `max_message_size` before allocating, and an EOF inside a
//! frame is reported as [`NetError::Truncated`].

use crate::error::{NetError, Result};
use pkchain_consensus::{Proposal, Vote};
use pkchain_core::{Block, BlockId, Hash, Transaction};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Envelope format version written by this node.
pub const ENVELOPE_VERSION: u8 = 1;

/// Size of the length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Tag byte identifying the payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Transaction = 1,
    Block = 2,
    Proposal = 3,
    Vote = 4,
    ChainRequest = 5,
    ChainResponse = 6,
}

impl MessageKind {
    pub fn from_u8(tag: u8) -> Result<Self> {
        Ok(match tag {
            1 => Self::Transaction,
            2 => Self::Block,
            3 => Self::Proposal,
            4 => Self::Vote,
            5 => Self::ChainRequest,
            6 => Self::ChainResponse,
            other => return Err(NetError::UnknownKind(other)),
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Block => "block",
            Self::Proposal => "proposal",
            Self::Vote => "vote",
            Self::ChainRequest => "chain-request",
            Self::ChainResponse => "chain-response",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A peer's answer to a [`Message::Proposal`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReply {
    /// Hash of the draft being voted on.
    pub block_hash: Hash,
    /// Identity of the voting validator.
    pub voter: String,
    pub vote: Vote,
}

/// Everything validators and clients exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A client-built transaction for the mempool.
    Transaction(Transaction),
    /// A block committed by its generator.
    Block(Block),
    /// A draft block put to a vote; answered with [`Message::Vote`].
    Proposal(Proposal),
    Vote(VoteReply),
    /// Ask for confirmed blocks with id `from_id` onward.
    ChainRequest { from_id: BlockId },
    ChainResponse(Vec<Block>),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Transaction(_) => MessageKind::Transaction,
            Self::Block(_) => MessageKind::Block,
            Self::Proposal(_) => MessageKind::Proposal,
            Self::Vote(_) => MessageKind::Vote,
            Self::ChainRequest { .. } => MessageKind::ChainRequest,
            Self::ChainResponse(_) => MessageKind::ChainResponse,
        }
    }

    /// Encode as an envelope: kind, version, bincode payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = match self {
            Self::Transaction(tx) => bincode::serialize(tx)?,
            Self::Block(block) => bincode::serialize(block)?,
            Self::Proposal(proposal) => bincode::serialize(proposal)?,
            Self::Vote(reply) => bincode::serialize(reply)?,
            Self::ChainRequest { from_id } => bincode::serialize(from_id)?,
            Self::ChainResponse(blocks) => bincode::serialize(blocks)?,
        };

        let mut envelope = Vec::with_capacity(2 + payload.len());
        envelope.push(self.kind() as u8);
        envelope.push(ENVELOPE_VERSION);
        envelope.extend_from_slice(&payload);
        Ok(envelope)
    }

    /// Decode an envelope produced by [`Message::encode`].
    pub fn decode(envelope: &[u8]) -> Result<Self> {
        let [tag, version, payload @ ..] = envelope else {
            return Err(NetError::Truncated);
        };
        let kind = MessageKind::from_u8(*tag)?;
        if *version != ENVELOPE_VERSION {
            return Err(NetError::UnsupportedVersion(*version));
        }

        Ok(match kind {
            MessageKind::Transaction => Self::Transaction(bincode::deserialize(payload)?),
            MessageKind::Block => Self::Block(bincode::deserialize(payload)?),
            MessageKind::Proposal => Self::Proposal(bincode::deserialize(payload)?),
            MessageKind::Vote => Self::Vote(bincode::deserialize(payload)?),
            MessageKind::ChainRequest => Self::ChainRequest {
                from_id: bincode::deserialize(payload)?,
            },
            MessageKind::ChainResponse => Self::ChainResponse(bincode::deserialize(payload)?),
        })
    }

    /// Encode with the length prefix, enforcing `max_message_size`.
    pub fn encode_framed(&self, max_message_size: usize) -> Result<Vec<u8>> {
        let envelope = self.encode()?;
        if envelope.len() > max_message_size || envelope.len() > u32::MAX as usize {
            return Err(NetError::MessageTooLarge {
                size: envelope.len(),
                max: max_message_size,
            });
        }

        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + envelope.len());
        frame.extend_from_slice(&(envelope.len() as u32).to_le_bytes());
        frame.extend_from_slice(&envelope);
        Ok(frame)
    }
}

/// Write one framed message.
pub async fn write_frame<W>(writer: &mut W, msg: &Message, max_message_size: usize) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = msg.encode_framed(max_message_size)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one raw envelope.
///
/// Returns `Ok(None)` when the peer closed the connection between frames.
pub async fn read_envelope<R>(reader: &mut R, max_message_size: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        let n = match reader.read(&mut header[filled..]).await {
            Ok(n) => n,
            // TLS peers that skip close_notify surface as UnexpectedEof.
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => 0,
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(NetError::Truncated)
            };
        }
        filled += n;
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > max_message_size {
        return Err(NetError::MessageTooLarge {
            size: len,
            max: max_message_size,
        });
    }

    let mut envelope = vec![0u8; len];
    match reader.read_exact(&mut envelope).await {
        Ok(_) => Ok(Some(envelope)),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(NetError::Truncated),
        Err(e) => Err(e.into()),
    }
}

/// Read and decode one framed message.
pub async fn read_frame<R>(reader: &mut R, max_message_size: usize) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    match read_envelope(reader, max_message_size).await? {
        Some(envelope) => Message::decode(&envelope).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkchain_core::{Operation, OperationResult};

    const MAX: usize = 1024 * 1024;

    fn sample_tx() -> Transaction {
        Transaction::new(
            "client",
            Operation::Register {
                name: "alice".into(),
                public_key: "PK1".into(),
            },
            OperationResult::success(),
        )
    }

    fn sample_block() -> Block {
        Block::draft(&Block::genesis(), vec![sample_tx()], "alpha").unwrap()
    }

    #[test]
    fn test_envelope_header() {
        let envelope = Message::ChainRequest { from_id: 3 }.encode().unwrap();
        assert_eq!(envelope[0], MessageKind::ChainRequest as u8);
        assert_eq!(envelope[1], ENVELOPE_VERSION);
    }

    #[test]
    fn test_decode_preserves_every_kind() {
        let block = sample_block();
        let messages = vec![
            Message::Transaction(sample_tx()),
            Message::Block(block.clone()),
            Message::Proposal(Proposal {
                draft: block.clone(),
                first: 0,
                last: 0,
            }),
            Message::Vote(VoteReply {
                block_hash: block.hash(),
                voter: "beta".into(),
                vote: Vote::Yes,
            }),
            Message::ChainRequest { from_id: 1 },
            Message::ChainResponse(vec![Block::genesis(), block]),
        ];

        for msg in messages {
            let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
            assert_eq!(decoded.kind(), msg.kind());
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn test_decode_unknown_kind() {
        let mut envelope = Message::ChainRequest { from_id: 0 }.encode().unwrap();
        envelope[0] = 42;
        assert!(matches!(
            Message::decode(&envelope),
            Err(NetError::UnknownKind(42))
        ));
    }

    #[test]
    fn test_decode_unsupported_version() {
        let mut envelope = Message::ChainRequest { from_id: 0 }.encode().unwrap();
        envelope[1] = 9;
        assert!(matches!(
            Message::decode(&envelope),
            Err(NetError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_decode_corrupt_payload() {
        let mut envelope = Message::Transaction(sample_tx()).encode().unwrap();
        envelope.truncate(10);
        assert!(matches!(
            Message::decode(&envelope),
            Err(NetError::Serialization(_))
        ));
        assert!(matches!(Message::decode(&[1]), Err(NetError::Truncated)));
    }

    #[test]
    fn test_encode_framed_enforces_limit() {
        let msg = Message::Block(sample_block());
        assert!(matches!(
            msg.encode_framed(16),
            Err(NetError::MessageTooLarge { max: 16, .. })
        ));

        let frame = msg.encode_framed(MAX).unwrap();
        let len = u32::from_le_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(len, frame.len() - FRAME_HEADER_LEN);
    }

    #[tokio::test]
    async fn test_multiple_frames_per_stream() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        let first = Message::Transaction(sample_tx());
        let second = Message::ChainRequest { from_id: 7 };

        write_frame(&mut client, &first, MAX).await.unwrap();
        write_frame(&mut client, &second, MAX).await.unwrap();
        drop(client);

        assert_eq!(read_frame(&mut server, MAX).await.unwrap(), Some(first));
        assert_eq!(read_frame(&mut server, MAX).await.unwrap(), Some(second));
        assert_eq!(read_frame(&mut server, MAX).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_truncated_frame() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        let frame = Message::Transaction(sample_tx()).encode_framed(MAX).unwrap();
        client.write_all(&frame[..frame.len() - 3]).await.unwrap();
        drop(client);

        assert!(matches!(
            read_frame(&mut server, MAX).await,
            Err(NetError::Truncated)
        ));
    }

    #[tokio::test]
    async fn test_truncated_header() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(&[5, 0]).await.unwrap();
        drop(client);

        assert!(matches!(
            read_frame(&mut server, MAX).await,
            Err(NetError::Truncated)
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_before_read() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(&(u32::MAX).to_le_bytes()).await.unwrap();

        assert!(matches!(
            read_frame(&mut server, MAX).await,
            Err(NetError::MessageTooLarge { .. })
        ));
    }
}
