//! piece-fetch
//!
//! A minimal BitTorrent client: bencode codec, torrent metadata, HTTP tracker
//! announce, peer handshake and a verified single-piece download.

pub mod bencode;
pub mod torrent;
pub mod tracker;
pub mod protocol;
pub mod peer;
pub mod storage;
pub mod cli;
pub mod error;

pub use error::TorrentError;

pub use bencode::{BencodeDict, BencodeKind, BencodeValue};
pub use torrent::{TorrentParser, TorrentInfo};
pub use tracker::{AnnounceRequest, AnnounceResponse, HttpTracker, PeerSource};
pub use protocol::{Handshake, Message, MessageId};
pub use peer::{parse_compact_peers, PeerConnection, PeerEndpoint};
pub use storage::{block_layout, download_file, download_piece_from, Block, PieceBuffer, PieceDownloader};
pub use cli::{CliArgs, Command, Config, ProgressDisplay, DownloadStats};
