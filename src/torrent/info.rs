//! Torrent information structures
//!
//! The read-only metadata record derived from a metainfo file.

use anyhow::Result;
use sha1::{Digest, Sha1};

use crate::error::TorrentError;

/// Length of a SHA-1 digest, used for both info hashes and piece hashes
pub const HASH_LEN: usize = 20;

/// Metadata of a single-file torrent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentInfo {
    /// Tracker announce URL
    pub announce: String,
    /// Suggested file name, when the metainfo carries one
    pub name: Option<String>,
    /// Total content length in bytes
    pub length: u64,
    /// Size of each piece in bytes (the last piece may be shorter)
    pub piece_length: u64,
    /// Piece hashes in piece order
    pub pieces: Vec<[u8; 20]>,
    /// SHA-1 of the raw bytes of the info dictionary
    pub info_hash: [u8; 20],
}

impl TorrentInfo {
    /// Total content length
    pub fn total_size(&self) -> u64 {
        self.length
    }

    /// Number of pieces in the torrent
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Info hash as lowercase hex
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    /// Piece hashes as lowercase hex, in piece order
    pub fn piece_hashes_hex(&self) -> Vec<String> {
        self.pieces.iter().map(hex::encode).collect()
    }

    /// SHA-1 over the exact bytes of an info dictionary
    pub fn generate_info_hash(info_dict_bytes: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(info_dict_bytes);
        hasher.finalize().into()
    }

    /// Split the concatenated `pieces` string into 20-byte hashes
    pub fn parse_piece_hashes(pieces_bytes: &[u8]) -> Result<Vec<[u8; 20]>> {
        if pieces_bytes.len() % HASH_LEN != 0 {
            return Err(TorrentError::structural_error_with_field(
                format!("pieces length {} is not a multiple of {}", pieces_bytes.len(), HASH_LEN),
                "pieces",
            )
            .into());
        }

        Ok(pieces_bytes
            .chunks_exact(HASH_LEN)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect())
    }

    /// Expected hash of a piece
    pub fn piece_hash(&self, index: usize) -> Option<[u8; 20]> {
        self.pieces.get(index).copied()
    }

    /// Byte range `[start, end)` of a piece within the content
    pub fn piece_range(&self, index: usize) -> Option<(u64, u64)> {
        if index >= self.pieces.len() {
            return None;
        }

        let start = (index as u64) * self.piece_length;
        let end = std::cmp::min(start + self.piece_length, self.length);
        Some((start, end))
    }

    /// Length of a piece; only the last one can be shorter than `piece_length`
    pub fn piece_size(&self, index: usize) -> Option<u64> {
        self.piece_range(index).map(|(start, end)| end - start)
    }
}
