//! Piece assembly
//!
//! Splits a piece into request blocks and reassembles the blocks a peer sends
//! back into one buffer that is then checked against the piece hash.

use anyhow::Result;
use sha1::{Digest, Sha1};
use tracing::{debug, error, trace};

use crate::error::TorrentError;
use crate::protocol::Message;

/// Size of every request block except possibly the last one of a piece
pub const BLOCK_SIZE: u32 = 16 * 1024;

/// One block request within a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Piece index this block belongs to
    pub piece_index: u32,
    /// Offset within the piece
    pub offset: u32,
    /// Length of the block
    pub length: u32,
}

impl Block {
    pub fn new(piece_index: u32, offset: u32, length: u32) -> Self {
        Self { piece_index, offset, length }
    }

    /// The Request message asking for this block
    pub fn request(&self) -> Message {
        Message::Request {
            index: self.piece_index,
            begin: self.offset,
            length: self.length,
        }
    }
}

/// Cut a piece of `piece_length` bytes into blocks of at most `BLOCK_SIZE`.
///
/// The last block carries the remainder.
pub fn block_layout(piece_index: u32, piece_length: u32) -> Vec<Block> {
    let count = piece_length.div_ceil(BLOCK_SIZE);
    (0..count)
        .map(|i| {
            let offset = i * BLOCK_SIZE;
            let length = BLOCK_SIZE.min(piece_length - offset);
            Block::new(piece_index, offset, length)
        })
        .collect()
}

/// Assembly buffer for a single piece
#[derive(Debug)]
pub struct PieceBuffer {
    index: u32,
    expected_hash: [u8; 20],
    data: Vec<u8>,
    /// One flag per block slot
    received: Vec<bool>,
}

impl PieceBuffer {
    pub fn new(index: u32, length: u32, expected_hash: [u8; 20]) -> Self {
        let slots = length.div_ceil(BLOCK_SIZE) as usize;
        Self {
            index,
            expected_hash,
            data: vec![0u8; length as usize],
            received: vec![false; slots],
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Blocks to request for this piece
    pub fn blocks(&self) -> Vec<Block> {
        block_layout(self.index, self.len())
    }

    /// Copy one block payload in at its declared offset.
    ///
    /// The block must belong to this piece, start on a block boundary, carry
    /// exactly the requested length and not have been seen before.
    pub fn add_block(&mut self, piece_index: u32, offset: u32, block: &[u8]) -> Result<()> {
        if piece_index != self.index {
            error!("Got block for piece {} while assembling piece {}", piece_index, self.index);
            return Err(TorrentError::protocol_error_with_source(
                "Block for unexpected piece",
                format!("expected piece {}, got {}", self.index, piece_index),
            )
            .into());
        }

        if offset % BLOCK_SIZE != 0 || offset >= self.len() {
            error!("Block offset {} is not a requested block of piece {}", offset, self.index);
            return Err(TorrentError::protocol_error_with_source(
                "Block offset was never requested",
                format!("offset {} in piece of {} bytes", offset, self.len()),
            )
            .into());
        }

        let slot = (offset / BLOCK_SIZE) as usize;
        let expected_len = BLOCK_SIZE.min(self.len() - offset) as usize;
        if block.len() != expected_len {
            error!("Block at {} has {} bytes, expected {}", offset, block.len(), expected_len);
            return Err(TorrentError::protocol_error_with_source(
                "Block has wrong length",
                format!("offset {}: expected {} bytes, got {}", offset, expected_len, block.len()),
            )
            .into());
        }

        if self.received[slot] {
            error!("Duplicate block at offset {} of piece {}", offset, self.index);
            return Err(TorrentError::protocol_error_with_source(
                "Duplicate block",
                format!("offset {} of piece {}", offset, self.index),
            )
            .into());
        }

        let start = offset as usize;
        self.data[start..start + expected_len].copy_from_slice(block);
        self.received[slot] = true;
        trace!(
            "Piece {}: stored block at {} ({}/{})",
            self.index,
            offset,
            self.received_blocks(),
            self.block_count()
        );
        Ok(())
    }

    /// Every block slot has been written
    pub fn is_complete(&self) -> bool {
        self.received.iter().all(|&r| r)
    }

    pub fn block_count(&self) -> usize {
        self.received.len()
    }

    pub fn received_blocks(&self) -> usize {
        self.received.iter().filter(|&&r| r).count()
    }

    /// SHA-1 of the assembled bytes
    pub fn digest(&self) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(&self.data);
        hasher.finalize().into()
    }

    /// Check the assembled bytes against the expected hash
    pub fn verify(&self) -> Result<()> {
        let actual = self.digest();
        if actual != self.expected_hash {
            error!(
                "Piece {} failed verification: expected {}, got {}",
                self.index,
                hex::encode(self.expected_hash),
                hex::encode(actual)
            );
            return Err(TorrentError::integrity_error(self.index, self.expected_hash, actual).into());
        }
        debug!("Piece {} verified ({} bytes)", self.index, self.data.len());
        Ok(())
    }

    /// Hand out the assembled bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
