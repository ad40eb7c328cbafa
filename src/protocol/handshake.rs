//! BitTorrent handshake protocol
//!
//! The fixed 68-byte exchange that opens every peer connection:
//!
//! | offset | length | content                    |
//! |--------|--------|----------------------------|
//! | 0      | 1      | 19                         |
//! | 1      | 19     | `"BitTorrent protocol"`    |
//! | 20     | 8      | reserved, zero             |
//! | 28     | 20     | info hash                  |
//! | 48     | 20     | peer id                    |

use anyhow::Result;
use bytes::{BufMut, BytesMut};
use tracing::{debug, error, info, trace, warn};

use crate::error::TorrentError;

/// BitTorrent protocol identifier string
pub const PROTOCOL_STRING: &str = "BitTorrent protocol";

/// Length of the protocol string
pub const PROTOCOL_LENGTH: u8 = 19;

/// Total length of a handshake on the wire
pub const HANDSHAKE_LENGTH: usize = 68;

/// Client prefix for generated peer ids
pub const PEER_ID_PREFIX: &[u8; 8] = b"-PF0001-";

/// BitTorrent handshake message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Protocol identifier (19 bytes)
    pub protocol_id: [u8; 19],
    /// Reserved bytes; always sent as zero
    pub reserved: [u8; 8],
    /// Torrent info hash
    pub info_hash: [u8; 20],
    /// Sender's peer ID
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Create a new handshake with info_hash and peer_id
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        debug!("Creating new handshake for info_hash: {}", hex::encode(info_hash));
        let mut protocol_id = [0u8; 19];
        protocol_id.copy_from_slice(PROTOCOL_STRING.as_bytes());
        Self {
            protocol_id,
            reserved: [0u8; 8],
            info_hash,
            peer_id,
        }
    }

    /// Generate a random peer ID with the client prefix
    pub fn generate_peer_id() -> [u8; 20] {
        let mut peer_id = [0u8; 20];
        peer_id[..8].copy_from_slice(PEER_ID_PREFIX);
        peer_id[8..].copy_from_slice(&rand::random::<[u8; 12]>());
        info!("Generated new peer ID: {}", hex::encode(peer_id));
        peer_id
    }

    /// Serialize the handshake to its 68-byte wire form
    pub fn serialize(&self) -> Vec<u8> {
        trace!("Serializing handshake");
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LENGTH);
        buf.put_u8(PROTOCOL_LENGTH);
        buf.put_slice(&self.protocol_id);
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
        trace!("Handshake serialized: {} bytes", buf.len());
        buf.to_vec()
    }

    /// Deserialize a handshake from its 68-byte wire form
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        trace!("Deserializing handshake from {} bytes", data.len());

        if data.len() != HANDSHAKE_LENGTH {
            error!("Handshake has wrong size: expected {} bytes, got {}", HANDSHAKE_LENGTH, data.len());
            return Err(TorrentError::protocol_error_with_source(
                "Handshake has wrong size",
                format!("expected {} bytes, got {}", HANDSHAKE_LENGTH, data.len()),
            )
            .into());
        }

        let protocol_length = data[0];
        if protocol_length != PROTOCOL_LENGTH {
            error!("Invalid protocol length: expected {}, got {}", PROTOCOL_LENGTH, protocol_length);
            return Err(TorrentError::protocol_error_with_source(
                "Invalid protocol length",
                format!("expected {}, got {}", PROTOCOL_LENGTH, protocol_length),
            )
            .into());
        }

        if &data[1..20] != PROTOCOL_STRING.as_bytes() {
            error!("Invalid protocol string");
            return Err(TorrentError::protocol_error_with_source(
                "Invalid protocol string",
                String::from_utf8_lossy(&data[1..20]).into_owned(),
            )
            .into());
        }

        let mut protocol_id = [0u8; 19];
        protocol_id.copy_from_slice(&data[1..20]);

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&data[20..28]);
        trace!("Handshake reserved bytes: {}", hex::encode(reserved));

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);

        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);
        debug!("Handshake peer_id: {}", hex::encode(peer_id));

        Ok(Self {
            protocol_id,
            reserved,
            info_hash,
            peer_id,
        })
    }

    /// Check that the remote side is talking about the same torrent
    pub fn validate(&self, expected_info_hash: &[u8; 20]) -> bool {
        if self.info_hash != *expected_info_hash {
            warn!("Handshake validation failed: info hash mismatch");
            warn!("  Expected: {}", hex::encode(expected_info_hash));
            warn!("  Got:      {}", hex::encode(self.info_hash));
            return false;
        }

        debug!("Handshake validation successful");
        true
    }
}
