//! BitTorrent protocol module
//!
//! Handshake layout, message framing and the stream codec that moves them.

pub mod handshake;
pub mod message;
pub mod wire;

// Re-export main types
pub use handshake::{Handshake, HANDSHAKE_LENGTH, PROTOCOL_LENGTH, PROTOCOL_STRING};
pub use message::{Message, MessageId};
pub use wire::{BitTorrentWire, WireProtocol, MAX_MESSAGE_LENGTH};
