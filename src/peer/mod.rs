//! Peer module
//!
//! Peer addresses and the per-handshake session used to talk to one peer.

pub mod connection;
pub mod endpoint;

// Re-export main types
pub use connection::{PeerConnection, DEFAULT_CONNECT_TIMEOUT};
pub use endpoint::{parse_compact_peers, PeerEndpoint, COMPACT_PEER_LEN};
