//! Storage module
//!
//! Piece assembly and the single-peer download flow.

pub mod download;
pub mod piece;

// Re-export piece types
pub use piece::{block_layout, Block, PieceBuffer, BLOCK_SIZE};

// Re-export download types
pub use download::{download_file, download_piece_from, DownloadState, PieceDownloader};
