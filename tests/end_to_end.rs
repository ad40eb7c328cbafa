//! Full flow against a loopback tracker and a loopback seeder:
//! metainfo bytes, announce, handshake, piece and file download.

use std::net::Ipv4Addr;
use std::time::Duration;

use piece_fetch::bencode::{encode, BencodeValue};
use piece_fetch::protocol::{BitTorrentWire, WireProtocol};
use piece_fetch::{
    download_file, download_piece_from, AnnounceRequest, Handshake, HttpTracker, Message, PeerConnection,
    PeerEndpoint, PeerSource, TorrentError, TorrentInfo, TorrentParser,
};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const PIECE_LENGTH: usize = 32768;
const OUR_PEER_ID: [u8; 20] = *b"-PF0001-integration1";
const SEEDER_PEER_ID: [u8; 20] = *b"-SD0001-seeder000001";

fn content() -> Vec<u8> {
    (0..70000u32).map(|i| (i.wrapping_mul(31) % 253) as u8).collect()
}

fn metainfo(announce: &str, content: &[u8]) -> Vec<u8> {
    let pieces: Vec<u8> = content
        .chunks(PIECE_LENGTH)
        .flat_map(|chunk| Sha1::digest(chunk).to_vec())
        .collect();

    let info = BencodeValue::dict([
        ("length", BencodeValue::integer(content.len() as i64)),
        ("name", BencodeValue::bytes("sample.bin")),
        ("piece length", BencodeValue::integer(PIECE_LENGTH as i64)),
        ("pieces", BencodeValue::bytes(pieces)),
    ]);
    encode(&BencodeValue::dict([
        ("announce", BencodeValue::bytes(announce)),
        ("info", info),
    ]))
}

/// Answers one announce with a compact list holding `peer`
async fn spawn_tracker(peer: PeerEndpoint) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/announce", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            if socket.read(&mut byte).await.unwrap() == 0 {
                break;
            }
            head.push(byte[0]);
        }

        let mut body = b"d8:intervali900e5:peers6:".to_vec();
        body.extend_from_slice(&peer.to_compact());
        body.push(b'e');

        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(&body);
        socket.write_all(&response).await.unwrap();
        socket.shutdown().await.ok();
    });

    url
}

/// Serves the pieces of `content` to any number of sessions
async fn spawn_seeder(content: Vec<u8>) -> PeerEndpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else { break };
            tokio::spawn(seed_session(socket, content.clone()));
        }
    });

    PeerEndpoint::new(Ipv4Addr::LOCALHOST, port)
}

async fn seed_session(mut socket: TcpStream, content: Vec<u8>) {
    let mut wire = BitTorrentWire;

    let Ok(theirs) = wire.read_handshake(&mut socket).await else { return };
    let ours = Handshake::new(theirs.info_hash, SEEDER_PEER_ID);
    if wire.write_handshake(&mut socket, &ours).await.is_err() {
        return;
    }

    let pieces = content.len().div_ceil(PIECE_LENGTH);
    let bitfield = vec![0xffu8; pieces.div_ceil(8)];
    if wire.write_message(&mut socket, &Message::Bitfield { bitfield }).await.is_err() {
        return;
    }

    while let Ok(message) = wire.read_message(&mut socket).await {
        let reply = match message {
            Message::Interested => Message::Unchoke,
            Message::Request { index, begin, length } => {
                let start = index as usize * PIECE_LENGTH + begin as usize;
                Message::Piece {
                    index,
                    begin,
                    block: content[start..start + length as usize].to_vec(),
                }
            }
            _ => continue,
        };
        if wire.write_message(&mut socket, &reply).await.is_err() {
            return;
        }
    }
}

async fn setup() -> (TorrentInfo, Vec<u8>, PeerEndpoint) {
    let content = content();
    let seeder = spawn_seeder(content.clone()).await;
    let announce = spawn_tracker(seeder).await;
    let torrent = TorrentParser::parse_bytes(&metainfo(&announce, &content)).unwrap();
    (torrent, content, seeder)
}

#[tokio::test]
async fn test_announce_then_download_every_piece() {
    let (torrent, content, seeder) = setup().await;
    assert_eq!(torrent.piece_count(), 3);
    assert_eq!(torrent.piece_size(2), Some(70000 - 2 * PIECE_LENGTH as u64));

    let tracker = HttpTracker::new(&torrent.announce, Duration::from_secs(5)).unwrap();
    let response = tracker
        .announce(&AnnounceRequest::new(&torrent, OUR_PEER_ID, 6881))
        .await
        .unwrap();
    assert_eq!(response.interval, Some(900));
    assert_eq!(response.peers, vec![seeder]);

    let mut seen = Vec::new();
    let file = download_file(&torrent, response.peers[0], OUR_PEER_ID, Duration::from_secs(5), |index, size| {
        seen.push((index, size));
    })
    .await
    .unwrap();

    assert_eq!(file, content);
    assert_eq!(seen, vec![(0, 32768), (1, 32768), (2, 4464)]);
}

#[tokio::test]
async fn test_download_last_piece() {
    let (torrent, content, seeder) = setup().await;

    let piece = download_piece_from(&torrent, 2, seeder, OUR_PEER_ID, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(piece, content[2 * PIECE_LENGTH..].to_vec());
}

#[tokio::test]
async fn test_handshake_reports_seeder_id() {
    let (torrent, _content, seeder) = setup().await;

    let connection = PeerConnection::connect(seeder, torrent.info_hash, OUR_PEER_ID, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(hex::encode(connection.remote_peer_id()), hex::encode(SEEDER_PEER_ID));
    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_wrong_content_fails_verification() {
    let (torrent, content, _seeder) = setup().await;

    let mut corrupted = content.clone();
    corrupted[PIECE_LENGTH + 5] ^= 0x01;
    let bad_seeder = spawn_seeder(corrupted).await;

    let err = download_piece_from(&torrent, 1, bad_seeder, OUR_PEER_ID, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<TorrentError>(), Some(TorrentError::IntegrityError { piece_index: 1, .. })));
    assert_eq!(TorrentError::kind_of(&err), Some("integrity"));
}
