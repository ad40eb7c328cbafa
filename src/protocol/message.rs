//! BitTorrent protocol messages
//!
//! Every frame after the handshake is a 4-byte big-endian length, then (when
//! the length is non-zero) a one-byte message id and the payload.

use anyhow::Result;
use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, error, trace};

use crate::error::TorrentError;

/// BitTorrent message IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            _ => {
                error!("Invalid message ID: {}", value);
                Err(TorrentError::protocol_error_with_source(
                    "Invalid message ID",
                    format!("value: {}", value),
                )
                .into())
            }
        }
    }
}

/// BitTorrent protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bitfield: Vec<u8> },
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
}

impl Message {
    /// Get the message ID (returns None for KeepAlive)
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Message::Choke => Some(MessageId::Choke),
            Message::Unchoke => Some(MessageId::Unchoke),
            Message::Interested => Some(MessageId::Interested),
            Message::NotInterested => Some(MessageId::NotInterested),
            Message::Have { .. } => Some(MessageId::Have),
            Message::Bitfield { .. } => Some(MessageId::Bitfield),
            Message::Request { .. } => Some(MessageId::Request),
            Message::Piece { .. } => Some(MessageId::Piece),
            Message::Cancel { .. } => Some(MessageId::Cancel),
            Message::KeepAlive => None,
        }
    }

    /// Get the message length (excluding the length prefix)
    pub fn length(&self) -> u32 {
        match self {
            Message::KeepAlive => 0,
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => 1,
            Message::Have { .. } => 5,
            Message::Bitfield { bitfield } => 1 + bitfield.len() as u32,
            Message::Request { .. } | Message::Cancel { .. } => 13,
            Message::Piece { block, .. } => 9 + block.len() as u32,
        }
    }

    /// The bytes following the message id
    pub fn payload(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        match self {
            Message::KeepAlive
            | Message::Choke
            | Message::Unchoke
            | Message::Interested
            | Message::NotInterested => {}
            Message::Have { piece_index } => buf.put_u32(*piece_index),
            Message::Bitfield { bitfield } => buf.put_slice(bitfield),
            Message::Request { index, begin, length } | Message::Cancel { index, begin, length } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
            Message::Piece { index, begin, block } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(block);
            }
        }
        buf.to_vec()
    }

    /// Serialize the message to bytes (including length prefix)
    pub fn serialize(&self) -> Vec<u8> {
        trace!("Serializing message: {:?}", self.message_id());
        let mut buf = BytesMut::with_capacity(4 + self.length() as usize);
        buf.put_u32(self.length());
        if let Some(id) = self.message_id() {
            buf.put_u8(id as u8);
            buf.put_slice(&self.payload());
        }
        trace!("Message serialized: {} bytes", buf.len());
        buf.to_vec()
    }

    /// Parse the bytes that follow the length prefix.
    ///
    /// An empty body is a keep-alive.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        let Some((&id, payload)) = body.split_first() else {
            debug!("Received KeepAlive message");
            return Ok(Message::KeepAlive);
        };

        let message_id = MessageId::try_from(id)?;
        let mut buf = payload;

        if matches!(
            message_id,
            MessageId::Choke | MessageId::Unchoke | MessageId::Interested | MessageId::NotInterested
        ) {
            expect_payload_len(message_id, buf, 0, true)?;
        }

        let message = match message_id {
            MessageId::Choke => Message::Choke,
            MessageId::Unchoke => Message::Unchoke,
            MessageId::Interested => Message::Interested,
            MessageId::NotInterested => Message::NotInterested,
            MessageId::Have => {
                expect_payload_len(message_id, buf, 4, true)?;
                Message::Have { piece_index: buf.get_u32() }
            }
            MessageId::Bitfield => Message::Bitfield { bitfield: buf.to_vec() },
            MessageId::Request => {
                expect_payload_len(message_id, buf, 12, true)?;
                Message::Request {
                    index: buf.get_u32(),
                    begin: buf.get_u32(),
                    length: buf.get_u32(),
                }
            }
            MessageId::Piece => {
                expect_payload_len(message_id, buf, 8, false)?;
                let index = buf.get_u32();
                let begin = buf.get_u32();
                Message::Piece { index, begin, block: buf.to_vec() }
            }
            MessageId::Cancel => {
                expect_payload_len(message_id, buf, 12, true)?;
                Message::Cancel {
                    index: buf.get_u32(),
                    begin: buf.get_u32(),
                    length: buf.get_u32(),
                }
            }
        };

        debug!("Received {:?} message ({} payload bytes)", message_id, payload.len());
        Ok(message)
    }
}

fn expect_payload_len(id: MessageId, payload: &[u8], expected: usize, exact: bool) -> Result<()> {
    let ok = if exact { payload.len() == expected } else { payload.len() >= expected };
    if ok {
        return Ok(());
    }
    error!("{:?} payload has {} bytes, expected {}", id, payload.len(), expected);
    Err(TorrentError::protocol_error_with_source(
        format!("{:?} message has wrong payload size", id),
        format!("expected {}{} bytes, got {}", if exact { "" } else { "at least " }, expected, payload.len()),
    )
    .into())
}
