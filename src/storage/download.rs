//! Piece download
//!
//! Drives one handshaken session through a fixed exchange:
//! Bitfield, Interested, Unchoke, all Requests, the Piece replies, then the
//! hash check. Anything the peer sends out of turn aborts the download.

use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, trace, warn};

use crate::error::TorrentError;
use crate::peer::{PeerConnection, PeerEndpoint};
use crate::protocol::Message;
use crate::storage::piece::PieceBuffer;
use crate::torrent::TorrentInfo;

/// Where the downloader is in the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    /// Waiting for the peer's Bitfield
    AwaitBitfield,
    /// Interested sent, waiting for Unchoke
    AwaitUnchoke,
    /// Requests sent, collecting Piece messages
    Receiving,
    /// All blocks in, checking the hash
    Verifying,
    Done,
    Failed,
}

/// Downloads a single piece over a session it owns
pub struct PieceDownloader<S> {
    connection: PeerConnection<S>,
    state: DownloadState,
}

impl<S> PieceDownloader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(connection: PeerConnection<S>) -> Self {
        Self {
            connection,
            state: DownloadState::AwaitBitfield,
        }
    }

    /// Fetch and verify piece `index` of `length` bytes.
    ///
    /// Consumes the session; it is closed whether the download succeeds or
    /// not. No bytes are returned unless the hash matches.
    pub async fn download(mut self, index: u32, length: u32, expected_hash: [u8; 20]) -> Result<Vec<u8>> {
        info!("Downloading piece {} ({} bytes) from {}", index, length, self.connection.label());
        let mut piece = PieceBuffer::new(index, length, expected_hash);

        let outcome = self.run(&mut piece).await;
        if let Err(e) = &outcome {
            warn!("Piece {} from {} failed in {:?}: {}", index, self.connection.label(), self.state, e);
            self.state = DownloadState::Failed;
        }

        self.connection.close().await?;
        outcome?;
        Ok(piece.into_bytes())
    }

    async fn run(&mut self, piece: &mut PieceBuffer) -> Result<()> {
        match self.connection.receive_message().await? {
            Message::Bitfield { bitfield } => {
                debug!("Peer {} sent bitfield of {} bytes", self.connection.label(), bitfield.len());
            }
            other => return Err(self.unexpected(&other)),
        }

        self.connection.send_interested().await?;
        self.state = DownloadState::AwaitUnchoke;

        match self.connection.receive_message().await? {
            Message::Unchoke => debug!("Peer {} unchoked us", self.connection.label()),
            other => return Err(self.unexpected(&other)),
        }

        let blocks = piece.blocks();
        for block in &blocks {
            trace!("Requesting block {} ({} bytes) of piece {}", block.offset, block.length, block.piece_index);
            self.connection.send_message(&block.request()).await?;
        }
        self.state = DownloadState::Receiving;
        debug!("Requested {} blocks of piece {}", blocks.len(), piece.index());

        while !piece.is_complete() {
            match self.connection.receive_message().await? {
                Message::Piece { index, begin, block } => piece.add_block(index, begin, &block)?,
                other => return Err(self.unexpected(&other)),
            }
        }

        self.state = DownloadState::Verifying;
        piece.verify()?;

        self.state = DownloadState::Done;
        info!("Piece {} downloaded and verified", piece.index());
        Ok(())
    }

    fn unexpected(&self, message: &Message) -> anyhow::Error {
        let kind = message
            .message_id()
            .map_or_else(|| "KeepAlive".to_string(), |id| format!("{:?}", id));
        error!("Peer {} sent {} while in {:?}", self.connection.label(), kind, self.state);
        TorrentError::protocol_error_with_source(
            format!("Unexpected {} message", kind),
            format!("state {:?}, peer {}", self.state, self.connection.label()),
        )
        .into()
    }
}

/// Connect to `peer`, handshake, and download one piece of `torrent`
pub async fn download_piece_from(
    torrent: &TorrentInfo,
    index: u32,
    peer: PeerEndpoint,
    our_peer_id: [u8; 20],
    connect_timeout: Duration,
) -> Result<Vec<u8>> {
    let (length, expected_hash) = piece_params(torrent, index)?;
    let connection = PeerConnection::connect(peer, torrent.info_hash, our_peer_id, connect_timeout).await?;
    PieceDownloader::new(connection).download(index, length, expected_hash).await
}

/// Download every piece in order from one peer, a fresh session per piece.
///
/// Every piece size is checked before the first connection. `on_piece` sees
/// each verified piece index and its size before the next piece starts.
pub async fn download_file<F>(
    torrent: &TorrentInfo,
    peer: PeerEndpoint,
    our_peer_id: [u8; 20],
    connect_timeout: Duration,
    mut on_piece: F,
) -> Result<Vec<u8>>
where
    F: FnMut(u32, usize),
{
    let count = u32::try_from(torrent.piece_count()).map_err(|_| {
        TorrentError::structural_error_with_field(format!("{} pieces is too many", torrent.piece_count()), "pieces")
    })?;
    let plan = (0..count)
        .map(|index| piece_params(torrent, index))
        .collect::<Result<Vec<_>>>()?;

    info!("Downloading {} pieces from {}", count, peer);
    let mut file = Vec::new();

    for (index, (length, expected_hash)) in (0..count).zip(plan) {
        let connection = PeerConnection::connect(peer, torrent.info_hash, our_peer_id, connect_timeout).await?;
        let piece = PieceDownloader::new(connection).download(index, length, expected_hash).await?;
        on_piece(index, piece.len());
        file.extend_from_slice(&piece);
    }

    info!("Download complete: {} bytes", file.len());
    Ok(file)
}

/// Size and expected hash of piece `index`
fn piece_params(torrent: &TorrentInfo, index: u32) -> Result<(u32, [u8; 20])> {
    let (Some(size), Some(hash)) = (torrent.piece_size(index as usize), torrent.piece_hash(index as usize)) else {
        return Err(TorrentError::config_error_with_field(
            format!("piece index {} out of range (torrent has {} pieces)", index, torrent.piece_count()),
            "piece_index",
        )
        .into());
    };

    let size = u32::try_from(size).map_err(|_| {
        TorrentError::structural_error_with_field(format!("piece of {} bytes is too large", size), "piece length")
    })?;
    Ok((size, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BitTorrentWire, Handshake, WireProtocol};
    use crate::storage::piece::BLOCK_SIZE;
    use sha1::{Digest, Sha1};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    const INFO_HASH: [u8; 20] = [0x42; 20];

    fn sha1(data: &[u8]) -> [u8; 20] {
        Sha1::digest(data).into()
    }

    fn piece_data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    async fn session() -> (PeerConnection<DuplexStream>, DuplexStream) {
        let (client, mut server) = duplex(1 << 20);
        let accept = tokio::spawn(async move {
            let mut buf = [0u8; 68];
            server.read_exact(&mut buf).await.unwrap();
            server.write_all(&Handshake::new(INFO_HASH, [0x01; 20]).serialize()).await.unwrap();
            server
        });
        let connection = PeerConnection::handshake(client, "memory", INFO_HASH, [0x02; 20]).await.unwrap();
        (connection, accept.await.unwrap())
    }

    /// Answer the exchange like a cooperative seeder. `tamper` may alter the
    /// replies before they are sent.
    async fn serve_piece(
        mut stream: DuplexStream,
        data: Vec<u8>,
        tamper: impl Fn(Vec<Message>) -> Vec<Message>,
    ) -> Vec<Message> {
        let mut wire = BitTorrentWire;
        let mut seen = Vec::new();

        wire.write_message(&mut stream, &Message::Bitfield { bitfield: vec![0xff] }).await.unwrap();
        seen.push(wire.read_message(&mut stream).await.unwrap());
        wire.write_message(&mut stream, &Message::Unchoke).await.unwrap();

        let mut replies = Vec::new();
        let blocks = data.len().div_ceil(BLOCK_SIZE as usize);
        for _ in 0..blocks {
            let request = wire.read_message(&mut stream).await.unwrap();
            if let Message::Request { index, begin, length } = request {
                let start = begin as usize;
                replies.push(Message::Piece {
                    index,
                    begin,
                    block: data[start..start + length as usize].to_vec(),
                });
            }
            seen.push(request);
        }

        for reply in tamper(replies) {
            if wire.write_message(&mut stream, &reply).await.is_err() {
                break;
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_download_piece_success() {
        let data = piece_data(40000);
        let (connection, remote) = session().await;
        let peer = tokio::spawn(serve_piece(remote, data.clone(), |r| r));

        let bytes = PieceDownloader::new(connection)
            .download(0, data.len() as u32, sha1(&data))
            .await
            .unwrap();
        assert_eq!(bytes, data);

        let seen = peer.await.unwrap();
        assert_eq!(
            seen,
            vec![
                Message::Interested,
                Message::Request { index: 0, begin: 0, length: 16384 },
                Message::Request { index: 0, begin: 16384, length: 16384 },
                Message::Request { index: 0, begin: 32768, length: 7232 },
            ]
        );
    }

    #[tokio::test]
    async fn test_download_piece_out_of_order_blocks() {
        let data = piece_data(3 * BLOCK_SIZE as usize);
        let (connection, remote) = session().await;
        let peer = tokio::spawn(serve_piece(remote, data.clone(), |mut r| {
            r.reverse();
            r
        }));

        let bytes = PieceDownloader::new(connection)
            .download(0, data.len() as u32, sha1(&data))
            .await
            .unwrap();
        assert_eq!(bytes, data);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupted_block_is_integrity_error() {
        let data = piece_data(20000);
        let (connection, remote) = session().await;
        tokio::spawn(serve_piece(remote, data.clone(), |mut r| {
            if let Some(Message::Piece { block, .. }) = r.last_mut() {
                block[0] ^= 0xff;
            }
            r
        }));

        let err = PieceDownloader::new(connection)
            .download(0, data.len() as u32, sha1(&data))
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<TorrentError>(), Some(TorrentError::IntegrityError { .. })));
    }

    #[tokio::test]
    async fn test_wrong_piece_index_is_protocol_error() {
        let data = piece_data(100);
        let (connection, remote) = session().await;
        tokio::spawn(serve_piece(remote, data.clone(), |r| {
            r.into_iter()
                .map(|m| match m {
                    Message::Piece { begin, block, .. } => Message::Piece { index: 9, begin, block },
                    other => other,
                })
                .collect()
        }));

        let err = PieceDownloader::new(connection)
            .download(0, data.len() as u32, sha1(&data))
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<TorrentError>(), Some(TorrentError::ProtocolError { .. })));
    }

    #[tokio::test]
    async fn test_keepalive_during_transfer_is_protocol_error() {
        let data = piece_data(100);
        let (connection, remote) = session().await;
        tokio::spawn(serve_piece(remote, data.clone(), |mut r| {
            r.insert(0, Message::KeepAlive);
            r
        }));

        let err = PieceDownloader::new(connection)
            .download(0, data.len() as u32, sha1(&data))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unexpected KeepAlive message"));
    }

    #[tokio::test]
    async fn test_first_message_not_bitfield() {
        let (connection, mut remote) = session().await;
        let peer = tokio::spawn(async move {
            let mut wire = BitTorrentWire;
            wire.write_message(&mut remote, &Message::Unchoke).await.unwrap();
            // Everything we get back before EOF
            let mut rest = Vec::new();
            remote.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let err = PieceDownloader::new(connection).download(0, 10, [0u8; 20]).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<TorrentError>(), Some(TorrentError::ProtocolError { .. })));
        assert!(err.to_string().contains("AwaitBitfield"));
        // No Interested, no Request went out
        assert!(peer.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_choke_instead_of_unchoke() {
        let (connection, mut remote) = session().await;
        tokio::spawn(async move {
            let mut wire = BitTorrentWire;
            wire.write_message(&mut remote, &Message::Bitfield { bitfield: vec![0x80] }).await.unwrap();
            let interested = wire.read_message(&mut remote).await.unwrap();
            assert_eq!(interested, Message::Interested);
            wire.write_message(&mut remote, &Message::Choke).await.unwrap();
        });

        let err = PieceDownloader::new(connection).download(0, 10, [0u8; 20]).await.unwrap_err();
        assert!(err.to_string().contains("Unexpected Choke message"));
    }

    #[tokio::test]
    async fn test_peer_hangs_up_mid_piece() {
        let data = piece_data(40000);
        let (connection, remote) = session().await;
        tokio::spawn(serve_piece(remote, data.clone(), |mut r| {
            r.truncate(1);
            r
        }));

        let err = PieceDownloader::new(connection)
            .download(0, data.len() as u32, sha1(&data))
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<TorrentError>(), Some(TorrentError::NetworkError { .. })));
    }

    #[test]
    fn test_piece_params_out_of_range() {
        let torrent = TorrentInfo {
            announce: "http://tracker.example/announce".to_string(),
            name: None,
            length: 100,
            piece_length: 64,
            pieces: vec![[1u8; 20], [2u8; 20]],
            info_hash: INFO_HASH,
        };
        assert_eq!(piece_params(&torrent, 1).unwrap(), (36, [2u8; 20]));
        let err = piece_params(&torrent, 2).unwrap_err();
        assert!(matches!(err.downcast_ref::<TorrentError>(), Some(TorrentError::ConfigError { .. })));
    }

    #[tokio::test]
    async fn test_download_file_rejects_oversized_piece_before_connecting() {
        let torrent = TorrentInfo {
            announce: "http://tracker.example/announce".to_string(),
            name: None,
            length: 1 << 62,
            piece_length: 1 << 62,
            pieces: vec![[1u8; 20]],
            info_hash: INFO_HASH,
        };

        // Nothing listens on port 1; reaching the network would be a NetworkError
        let peer = PeerEndpoint::new(std::net::Ipv4Addr::LOCALHOST, 1);
        let mut calls = 0;
        let err = download_file(&torrent, peer, [0x02; 20], Duration::from_secs(1), |_, _| calls += 1)
            .await
            .unwrap_err();

        assert!(matches!(err.downcast_ref::<TorrentError>(), Some(TorrentError::StructuralError { .. })));
        assert_eq!(calls, 0);
    }
}
