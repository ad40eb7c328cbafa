//! HTTP tracker client
//!
//! Announces to the tracker named in the metainfo and reads back the compact
//! peer list. One request, no retries.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::bencode;
use crate::error::TorrentError;
use crate::peer::{parse_compact_peers, PeerEndpoint};
use crate::torrent::TorrentInfo;

/// Default HTTP timeout for an announce
pub const DEFAULT_TRACKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters of one announce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceRequest {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
}

impl AnnounceRequest {
    /// Announce for a fresh download of the whole torrent
    pub fn new(torrent: &TorrentInfo, peer_id: [u8; 20], port: u16) -> Self {
        Self {
            info_hash: torrent.info_hash,
            peer_id,
            port,
            uploaded: 0,
            downloaded: 0,
            left: torrent.total_size(),
        }
    }

    /// Query string with the raw hash and peer id percent-encoded byte by byte
    pub fn query_string(&self) -> String {
        format!(
            "info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            urlencoding::encode_binary(&self.info_hash),
            urlencoding::encode_binary(&self.peer_id),
            self.port,
            self.uploaded,
            self.downloaded,
            self.left,
        )
    }
}

/// What the tracker told us
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceResponse {
    /// Seconds the tracker wants between announces, if given
    pub interval: Option<i64>,
    /// Peers from the compact `peers` string
    pub peers: Vec<PeerEndpoint>,
}

impl AnnounceResponse {
    /// Decode a bencoded tracker response body
    pub fn from_bencode(body: &[u8]) -> Result<Self> {
        let value = bencode::decode_all(body).map_err(|e| {
            error!("Tracker response is not valid bencode: {}", e);
            TorrentError::protocol_error_with_source("Tracker response is not valid bencode", e.to_string())
        })?;

        let dict = value.as_dict().ok_or_else(|| {
            TorrentError::protocol_error_with_source(
                "Tracker response is not a dictionary",
                value.type_name(),
            )
        })?;

        if let Some(reason) = dict.get(b"failure reason".as_slice()) {
            let reason = String::from_utf8_lossy(reason.as_bytes().unwrap_or_default()).into_owned();
            warn!("Tracker refused announce: {}", reason);
            return Err(TorrentError::protocol_error_with_source("Tracker returned failure", reason).into());
        }

        let peers = dict
            .get(b"peers".as_slice())
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| TorrentError::protocol_error("Tracker response lacks a compact 'peers' string"))?;
        let peers = parse_compact_peers(peers)?;

        let interval = dict.get(b"interval".as_slice()).and_then(|v| v.as_integer());
        debug!("Tracker returned {} peers (interval {:?})", peers.len(), interval);

        Ok(Self { interval, peers })
    }
}

/// Anything that can answer an announce with a list of peers
#[async_trait]
pub trait PeerSource: Send + Sync {
    async fn announce(&self, request: &AnnounceRequest) -> Result<AnnounceResponse>;
}

/// Tracker reached over HTTP(S)
pub struct HttpTracker {
    client: Client,
    url: Url,
}

impl HttpTracker {
    pub fn new(announce: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(announce).map_err(|e| {
            TorrentError::structural_error_with_field(format!("invalid announce URL: {}", e), "announce")
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(TorrentError::structural_error_with_field(
                format!("unsupported tracker scheme '{}'", url.scheme()),
                "announce",
            )
            .into());
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TorrentError::from)?;

        Ok(Self { client, url })
    }

    /// Full announce URL, keeping any query the announce URL already had
    pub fn announce_url(&self, request: &AnnounceRequest) -> Url {
        let mut url = self.url.clone();
        let query = match self.url.query() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, request.query_string()),
            _ => request.query_string(),
        };
        url.set_query(Some(&query));
        url
    }
}

#[async_trait]
impl PeerSource for HttpTracker {
    async fn announce(&self, request: &AnnounceRequest) -> Result<AnnounceResponse> {
        let url = self.announce_url(request);
        info!("Announcing to tracker: {}", self.url);
        debug!("Announce URL: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            error!("Tracker request failed: {}", e);
            TorrentError::from(e)
        })?;

        let response = response.error_for_status().map_err(|e| {
            error!("Tracker answered with status {:?}", e.status());
            TorrentError::from(e)
        })?;

        let body = response.bytes().await.map_err(TorrentError::from)?;
        debug!("Tracker response: {} bytes", body.len());

        AnnounceResponse::from_bencode(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request() -> AnnounceRequest {
        let mut info_hash = [0u8; 20];
        info_hash[0] = 0xd6;
        info_hash[1] = b'a';
        info_hash[2] = b' ';
        AnnounceRequest {
            info_hash,
            peer_id: *b"-PF0001-abcdefghijkl",
            port: 6881,
            uploaded: 0,
            downloaded: 0,
            left: 92063,
        }
    }

    /// Serve one canned HTTP response and hand back the request head
    async fn serve_once(status: &'static str, body: Vec<u8>) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/announce", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut byte = [0u8; 1];
            while !head.ends_with(b"\r\n\r\n") {
                if socket.read(&mut byte).await.unwrap() == 0 {
                    break;
                }
                head.push(byte[0]);
            }
            let mut response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            )
            .into_bytes();
            response.extend_from_slice(&body);
            socket.write_all(&response).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&head).into_owned()
        });

        (base, handle)
    }

    #[test]
    fn test_query_string_percent_encodes_raw_bytes() {
        let query = request().query_string();
        assert!(query.starts_with("info_hash=%D6a%20%00%00"));
        assert!(query.contains("&peer_id=-PF0001-abcdefghijkl&"));
        assert!(query.ends_with("&port=6881&uploaded=0&downloaded=0&left=92063&compact=1"));
    }

    #[test]
    fn test_announce_url_keeps_existing_query() {
        let tracker = HttpTracker::new("http://tracker.example/announce?key=abc", DEFAULT_TRACKER_TIMEOUT).unwrap();
        let url = tracker.announce_url(&request());
        assert!(url.as_str().starts_with("http://tracker.example/announce?key=abc&info_hash=%D6a%20"));
    }

    #[test]
    fn test_invalid_announce_url() {
        assert!(HttpTracker::new("not a url", DEFAULT_TRACKER_TIMEOUT).is_err());
        assert!(HttpTracker::new("udp://tracker.example:80", DEFAULT_TRACKER_TIMEOUT).is_err());
    }

    #[test]
    fn test_response_decodes_compact_peers() {
        let mut body = b"d8:intervali60e5:peers12:".to_vec();
        body.extend_from_slice(&[165, 232, 33, 77, 0xc8, 0xd5, 178, 62, 85, 20, 0xc9, 0x03]);
        body.push(b'e');

        let response = AnnounceResponse::from_bencode(&body).unwrap();
        assert_eq!(response.interval, Some(60));
        assert_eq!(
            response.peers,
            vec![
                PeerEndpoint::new(Ipv4Addr::new(165, 232, 33, 77), 51413),
                PeerEndpoint::new(Ipv4Addr::new(178, 62, 85, 20), 51459),
            ]
        );
    }

    #[test]
    fn test_response_errors_are_protocol_errors() {
        for body in [
            b"not bencode".to_vec(),
            b"i1e".to_vec(),
            b"d8:intervali60ee".to_vec(),
            b"d5:peersli1eee".to_vec(),
            b"d5:peers5:abcdee".to_vec(),
            b"d14:failure reason7:unknowne".to_vec(),
        ] {
            let err = AnnounceResponse::from_bencode(&body).unwrap_err();
            assert!(
                matches!(err.downcast_ref::<TorrentError>(), Some(TorrentError::ProtocolError { .. })),
                "body {:?} gave {:?}",
                String::from_utf8_lossy(&body),
                err
            );
        }
    }

    #[tokio::test]
    async fn test_announce_over_http() {
        let mut body = b"d8:intervali1800e5:peers6:".to_vec();
        body.extend_from_slice(&[127, 0, 0, 1, 0x1a, 0xe1]);
        body.push(b'e');
        let (base, server) = serve_once("200 OK", body).await;

        let tracker = HttpTracker::new(&base, DEFAULT_TRACKER_TIMEOUT).unwrap();
        let response = tracker.announce(&request()).await.unwrap();
        assert_eq!(response.peers, vec![PeerEndpoint::new(Ipv4Addr::LOCALHOST, 6881)]);

        let head = server.await.unwrap();
        assert!(head.starts_with("GET /announce?info_hash=%D6a%20"));
        assert!(head.contains("&compact=1 HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_announce_non_success_status_is_network_error() {
        let (base, _server) = serve_once("503 Service Unavailable", b"busy".to_vec()).await;

        let tracker = HttpTracker::new(&base, DEFAULT_TRACKER_TIMEOUT).unwrap();
        let err = tracker.announce(&request()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<TorrentError>(), Some(TorrentError::NetworkError { .. })));
    }

    #[tokio::test]
    async fn test_announce_connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/announce", listener.local_addr().unwrap());
        drop(listener);

        let tracker = HttpTracker::new(&base, Duration::from_secs(2)).unwrap();
        let err = tracker.announce(&request()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<TorrentError>(), Some(TorrentError::NetworkError { .. })));
    }
}
