//! Torrent metadata module
//!
//! Interprets a decoded metainfo file and computes its info hash.

pub mod parser;
pub mod info;

pub use parser::TorrentParser;
pub use info::TorrentInfo;
