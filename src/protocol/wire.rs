//! Wire protocol utilities
//!
//! Reads and writes handshakes and length-prefixed frames on any async stream.

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{error, trace};

use super::handshake::HANDSHAKE_LENGTH;
use super::{Handshake, Message};
use crate::error::TorrentError;

/// Largest frame accepted from a peer: a 16 KiB block plus headers fits
/// comfortably, as does the bitfield of any realistic torrent.
pub const MAX_MESSAGE_LENGTH: usize = 1 << 20;

/// WireProtocol trait for protocol utilities
pub trait WireProtocol {
    /// Read a complete message from the stream
    async fn read_message<R: AsyncReadExt + Unpin>(&mut self, reader: &mut R) -> Result<Message>;

    /// Write a message to the stream
    async fn write_message<W: AsyncWriteExt + Unpin>(&mut self, writer: &mut W, message: &Message) -> Result<()>;

    /// Read a handshake from the stream
    async fn read_handshake<R: AsyncReadExt + Unpin>(&mut self, reader: &mut R) -> Result<Handshake>;

    /// Write a handshake to the stream
    async fn write_handshake<W: AsyncWriteExt + Unpin>(&mut self, writer: &mut W, handshake: &Handshake) -> Result<()>;
}

/// Default implementation of WireProtocol
#[derive(Debug, Default, Clone, Copy)]
pub struct BitTorrentWire;

impl WireProtocol for BitTorrentWire {
    async fn read_message<R: AsyncReadExt + Unpin>(&mut self, reader: &mut R) -> Result<Message> {
        let mut length_buf = [0u8; 4];
        reader.read_exact(&mut length_buf).await.map_err(|e| {
            TorrentError::from(e).with_context("reading message length prefix")
        })?;
        let length = u32::from_be_bytes(length_buf) as usize;

        if length == 0 {
            trace!("Read keep-alive frame");
            return Ok(Message::KeepAlive);
        }

        if length > MAX_MESSAGE_LENGTH {
            error!("Peer announced a {} byte frame", length);
            return Err(TorrentError::protocol_error_with_source(
                "Message too large",
                format!("{} bytes exceeds limit of {}", length, MAX_MESSAGE_LENGTH),
            )
            .into());
        }

        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await.map_err(|e| {
            TorrentError::from(e).with_context(format!("reading {} byte message body", length))
        })?;

        Message::from_body(&body)
    }

    async fn write_message<W: AsyncWriteExt + Unpin>(&mut self, writer: &mut W, message: &Message) -> Result<()> {
        let serialized = message.serialize();
        writer.write_all(&serialized).await.map_err(TorrentError::from)?;
        writer.flush().await.map_err(TorrentError::from)?;
        trace!("Wrote {} byte frame", serialized.len());
        Ok(())
    }

    async fn read_handshake<R: AsyncReadExt + Unpin>(&mut self, reader: &mut R) -> Result<Handshake> {
        let mut buf = [0u8; HANDSHAKE_LENGTH];
        reader.read_exact(&mut buf).await.map_err(|e| {
            TorrentError::from(e).with_context("reading 68 byte handshake")
        })?;
        Handshake::deserialize(&buf)
    }

    async fn write_handshake<W: AsyncWriteExt + Unpin>(&mut self, writer: &mut W, handshake: &Handshake) -> Result<()> {
        let serialized = handshake.serialize();
        writer.write_all(&serialized).await.map_err(TorrentError::from)?;
        writer.flush().await.map_err(TorrentError::from)?;
        Ok(())
    }
}
