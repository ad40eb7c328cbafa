//! Peer endpoints
//!
//! IPv4 address and port of a remote peer, plus the 6-byte compact encoding
//! trackers use to ship them in bulk.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use anyhow::Result;

use crate::error::TorrentError;

/// Size of one compact peer record: 4 address bytes, 2 port bytes
pub const COMPACT_PEER_LEN: usize = 6;

/// Address of a remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerEndpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerEndpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    /// Compact 6-byte form: address octets, then big-endian port
    pub fn to_compact(&self) -> [u8; COMPACT_PEER_LEN] {
        let mut out = [0u8; COMPACT_PEER_LEN];
        out[..4].copy_from_slice(&self.ip.octets());
        out[4..].copy_from_slice(&self.port.to_be_bytes());
        out
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for PeerEndpoint {
    type Err = TorrentError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let addr: SocketAddrV4 = s.parse()?;
        Ok(Self::new(*addr.ip(), addr.port()))
    }
}

impl From<SocketAddrV4> for PeerEndpoint {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

/// Parse a compact peer string: every 6-byte chunk is one endpoint
pub fn parse_compact_peers(data: &[u8]) -> Result<Vec<PeerEndpoint>> {
    if data.len() % COMPACT_PEER_LEN != 0 {
        return Err(TorrentError::protocol_error_with_source(
            "Invalid compact peers data length",
            format!("{} is not a multiple of {}", data.len(), COMPACT_PEER_LEN),
        )
        .into());
    }

    Ok(data
        .chunks_exact(COMPACT_PEER_LEN)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            PeerEndpoint::new(ip, port)
        })
        .collect())
}
