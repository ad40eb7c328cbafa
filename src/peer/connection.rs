//! Peer connection module
//!
//! A `PeerConnection` is one handshaken session with one peer. It is created
//! per handshake attempt, owns its stream exclusively, and is consumed by
//! whoever drives it; dropping it closes the socket on every exit path.

use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::error::TorrentError;
use crate::peer::PeerEndpoint;
use crate::protocol::{BitTorrentWire, Handshake, Message, WireProtocol};

/// Default bound on connect + handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A handshaken session with a single peer
pub struct PeerConnection<S = TcpStream> {
    /// Human readable peer address, for logs and errors
    label: String,
    /// Exclusively owned stream
    stream: S,
    /// Peer id from the remote handshake
    remote_peer_id: [u8; 20],
    /// Wire protocol handler
    wire: BitTorrentWire,
}

impl PeerConnection<TcpStream> {
    /// Connect to a peer and perform the handshake, both bounded by `connect_timeout`
    pub async fn connect(
        endpoint: PeerEndpoint,
        info_hash: [u8; 20],
        our_peer_id: [u8; 20],
        connect_timeout: Duration,
    ) -> Result<Self> {
        info!("Connecting to peer: {}", endpoint);
        let label = endpoint.to_string();

        let attempt = async {
            let socket = TcpStream::connect(endpoint.socket_addr()).await.map_err(|e| {
                error!("Failed to connect to {}: {}", endpoint, e);
                TorrentError::network_error_full("Failed to connect", label.clone(), e.to_string())
            })?;
            debug!("Connected to peer: {}", endpoint);
            Self::handshake(socket, label.clone(), info_hash, our_peer_id).await
        };

        timeout(connect_timeout, attempt).await.map_err(|e| {
            warn!("Connect/handshake timeout to {} after {:?}", endpoint, connect_timeout);
            TorrentError::from(e).with_context(format!("connect and handshake with {}", label))
        })?
    }
}

impl<S> PeerConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Perform the handshake over an already open stream.
    ///
    /// On any failure the stream is dropped, which releases it.
    pub async fn handshake(
        mut stream: S,
        label: impl Into<String>,
        info_hash: [u8; 20],
        our_peer_id: [u8; 20],
    ) -> Result<Self> {
        let label = label.into();
        let mut wire = BitTorrentWire;

        debug!("Sending handshake to peer: {}", label);
        let ours = Handshake::new(info_hash, our_peer_id);
        wire.write_handshake(&mut stream, &ours).await.map_err(|e| {
            error!("Failed to send handshake to {}: {}", label, e);
            e.context(format!("sending handshake to {}", label))
        })?;

        debug!("Reading handshake from peer: {}", label);
        let theirs = wire.read_handshake(&mut stream).await.map_err(|e| {
            error!("Failed to read handshake from {}: {}", label, e);
            e.context(format!("reading handshake from {}", label))
        })?;

        if !theirs.validate(&info_hash) {
            return Err(TorrentError::protocol_error_with_source(
                "Handshake info hash mismatch",
                format!("peer {} answered for {}", label, hex::encode(theirs.info_hash)),
            )
            .into());
        }

        info!("Handshake complete with {} (peer id {})", label, hex::encode(theirs.peer_id));
        Ok(Self {
            label,
            stream,
            remote_peer_id: theirs.peer_id,
            wire,
        })
    }

    /// Send a message to the peer
    pub async fn send_message(&mut self, message: &Message) -> Result<()> {
        trace!("Sending {:?} message to peer: {}", message.message_id(), self.label);
        self.wire.write_message(&mut self.stream, message).await.map_err(|e| {
            error!("Failed to send message to {}: {}", self.label, e);
            e
        })
    }

    /// Receive the next message from the peer.
    ///
    /// No timeout: a stalled peer blocks the caller.
    pub async fn receive_message(&mut self) -> Result<Message> {
        let message = self.wire.read_message(&mut self.stream).await.map_err(|e| {
            error!("Failed to read message from {}: {}", self.label, e);
            e
        })?;
        trace!("Received {:?} message from peer: {}", message.message_id(), self.label);
        Ok(message)
    }

    /// Send interested message to the peer
    pub async fn send_interested(&mut self) -> Result<()> {
        debug!("Sending Interested to peer: {}", self.label);
        self.send_message(&Message::Interested).await
    }

    /// Shut the connection down and release the stream
    pub async fn close(mut self) -> Result<()> {
        info!("Closing connection to peer: {}", self.label);
        if let Err(e) = self.stream.shutdown().await {
            // The stream is dropped either way
            debug!("Shutdown of {} reported: {}", self.label, e);
        }
        Ok(())
    }

    /// Peer id the remote side sent in its handshake
    pub fn remote_peer_id(&self) -> [u8; 20] {
        self.remote_peer_id
    }

    /// Address label of the peer
    pub fn label(&self) -> &str {
        &self.label
    }
}
