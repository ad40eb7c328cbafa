//! Torrent file parser
//!
//! Handles parsing of .torrent files and extracting metadata.

use anyhow::Result;
use tracing::{debug, error, info, trace};

use crate::bencode::{self, BencodeDict, BencodeValue};
use crate::error::TorrentError;
use crate::torrent::info::TorrentInfo;

/// Parser for .torrent files
pub struct TorrentParser;

impl TorrentParser {
    /// Parse a .torrent file from bytes
    pub fn parse_bytes(data: &[u8]) -> Result<TorrentInfo> {
        info!("Parsing torrent file from {} bytes", data.len());
        trace!("Torrent data (first 100 bytes): {:?}", &data[..data.len().min(100)]);

        let root = bencode::decode_all(data)?;
        Self::convert_to_torrent_info(&root, data)
    }

    /// Parse a .torrent file from a file path
    pub fn parse_file(path: &std::path::Path) -> Result<TorrentInfo> {
        info!("Loading torrent file from: {}", path.display());

        let data = std::fs::read(path).map_err(|e| {
            error!("Failed to read torrent file '{}': {}", path.display(), e);
            TorrentError::storage_error_full("Failed to read torrent file", path.display().to_string(), e.to_string())
        })?;

        debug!("Read {} bytes from torrent file", data.len());
        Self::parse_bytes(&data)
    }

    /// Extract metadata from an already decoded root dictionary.
    ///
    /// `original_data` must be the exact input `root` was decoded from; the
    /// info hash is taken over `original_data[info.span()]`.
    pub fn convert_to_torrent_info(root: &BencodeValue, original_data: &[u8]) -> Result<TorrentInfo> {
        let root_dict = root.as_dict().ok_or_else(|| {
            TorrentError::structural_error(format!("root must be a dictionary, got {}", root.type_name()))
        })?;

        let announce = String::from_utf8_lossy(require_bytes(root_dict, "announce")?).into_owned();

        let info_value = require(root_dict, "info")?;
        let info_dict = info_value.as_dict().ok_or_else(|| wrong_variant("info", "dictionary", info_value))?;

        let length = require_integer(info_dict, "length")?;
        let length = u64::try_from(length).map_err(|_| {
            TorrentError::structural_error_with_field(format!("length must be non-negative, got {}", length), "length")
        })?;

        let piece_length = require_integer(info_dict, "piece length")?;
        if piece_length <= 0 {
            return Err(TorrentError::structural_error_with_field(
                format!("piece length must be positive, got {}", piece_length),
                "piece length",
            )
            .into());
        }
        let piece_length = piece_length as u64;

        let pieces = TorrentInfo::parse_piece_hashes(require_bytes(info_dict, "pieces")?)?;
        let expected_pieces = length.div_ceil(piece_length);
        if pieces.len() as u64 != expected_pieces {
            error!("Torrent declares {} piece hashes, content needs {}", pieces.len(), expected_pieces);
            return Err(TorrentError::structural_error_with_field(
                format!("expected {} piece hashes, found {}", expected_pieces, pieces.len()),
                "pieces",
            )
            .into());
        }

        let name = info_dict
            .get(b"name".as_slice())
            .and_then(|v| v.as_bytes())
            .map(|b| String::from_utf8_lossy(b).into_owned());

        let info_span = info_value.span();
        let info_bytes = original_data.get(info_span.clone()).ok_or_else(|| {
            TorrentError::structural_error(format!(
                "info span {:?} outside of {} input bytes",
                info_span,
                original_data.len()
            ))
        })?;
        let info_hash = TorrentInfo::generate_info_hash(info_bytes);
        debug!("Info dictionary spans bytes {:?}", info_span);

        info!("Parsed torrent: {} bytes in {} pieces, info hash {}", length, pieces.len(), hex::encode(info_hash));
        Ok(TorrentInfo {
            announce,
            name,
            length,
            piece_length,
            pieces,
            info_hash,
        })
    }
}

fn require<'a>(dict: &'a BencodeDict, key: &str) -> Result<&'a BencodeValue> {
    dict.get(key.as_bytes()).ok_or_else(|| {
        TorrentError::structural_error_with_field("missing required key", key).into()
    })
}

fn require_bytes<'a>(dict: &'a BencodeDict, key: &str) -> Result<&'a [u8]> {
    let value = require(dict, key)?;
    value.as_bytes().ok_or_else(|| wrong_variant(key, "byte string", value).into())
}

fn require_integer(dict: &BencodeDict, key: &str) -> Result<i64> {
    let value = require(dict, key)?;
    value.as_integer().ok_or_else(|| wrong_variant(key, "integer", value).into())
}

fn wrong_variant(key: &str, expected: &str, found: &BencodeValue) -> TorrentError {
    TorrentError::structural_error_with_field(format!("expected {}, found {}", expected, found.type_name()), key)
}
