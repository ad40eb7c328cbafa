//! Bencode decoder
//!
//! Single pass over the input. Each value's consumed length is tracked while
//! parsing, so no value is ever re-encoded to learn how long it was.

use anyhow::Result;
use tracing::{debug, trace};

use super::value::{BencodeDict, BencodeKind, BencodeValue};
use crate::error::TorrentError;

/// Maximum nesting of lists and dictionaries
pub const MAX_DEPTH: usize = 64;

/// Decode one value from the start of `data`.
///
/// Returns the value and the number of bytes it consumed. Bytes after the
/// value are left alone.
pub fn decode(data: &[u8]) -> Result<(BencodeValue, usize)> {
    if data.is_empty() {
        return Err(TorrentError::decode_error_at("empty input", 0).into());
    }

    let mut pos = 0;
    let value = decode_value(data, &mut pos, 0)?;
    trace!("Decoded {} from {} of {} bytes", value.type_name(), pos, data.len());
    Ok((value, pos))
}

/// Decode exactly one value spanning the whole of `data`
pub fn decode_all(data: &[u8]) -> Result<BencodeValue> {
    let (value, consumed) = decode(data)?;
    if consumed != data.len() {
        debug!("Trailing data after bencode value: {} of {} bytes used", consumed, data.len());
        return Err(TorrentError::decode_error_at(
            format!("{} trailing bytes after value", data.len() - consumed),
            consumed,
        )
        .into());
    }
    Ok(value)
}

fn decode_value(data: &[u8], pos: &mut usize, depth: usize) -> Result<BencodeValue> {
    if depth > MAX_DEPTH {
        return Err(TorrentError::decode_error_at("nesting too deep", *pos).into());
    }

    let Some(&byte) = data.get(*pos) else {
        return Err(TorrentError::decode_error_at("truncated input", *pos).into());
    };

    match byte {
        b'0'..=b'9' => decode_bytes(data, pos),
        b'i' => decode_integer(data, pos),
        b'l' => decode_list(data, pos, depth),
        b'd' => decode_dict(data, pos, depth),
        other => Err(TorrentError::decode_error_at(
            format!("unexpected byte 0x{:02x}", other),
            *pos,
        )
        .into()),
    }
}

fn decode_bytes(data: &[u8], pos: &mut usize) -> Result<BencodeValue> {
    let start = *pos;
    let colon = data[start..]
        .iter()
        .position(|&b| b == b':')
        .map(|p| start + p)
        .ok_or_else(|| TorrentError::decode_error_at("missing ':' in string header", start))?;

    let header = &data[start..colon];
    if !header.iter().all(u8::is_ascii_digit) {
        return Err(TorrentError::decode_error_at("invalid string length", start).into());
    }
    let length: usize = std::str::from_utf8(header)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| TorrentError::decode_error_at("invalid string length", start))?;

    let body_start = colon + 1;
    let remaining = data.len() - body_start;
    if length > remaining {
        return Err(TorrentError::decode_error_at(
            format!("declared string length {} exceeds remaining input {}", length, remaining),
            start,
        )
        .into());
    }

    let end = body_start + length;
    *pos = end;
    Ok(BencodeValue::with_span(
        BencodeKind::Bytes(data[body_start..end].to_vec()),
        start..end,
    ))
}

fn decode_integer(data: &[u8], pos: &mut usize) -> Result<BencodeValue> {
    let start = *pos;
    let body_start = start + 1;
    let end = data[body_start..]
        .iter()
        .position(|&b| b == b'e')
        .map(|p| body_start + p)
        .ok_or_else(|| TorrentError::decode_error_at("missing terminating 'e' for integer", start))?;

    let body = &data[body_start..end];
    let digits = body.strip_prefix(b"-").unwrap_or(body);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(TorrentError::decode_error_at(
            format!("non-numeric integer body {:?}", String::from_utf8_lossy(body)),
            start,
        )
        .into());
    }

    // Leading zeros and "-0" are accepted: the span still records exactly
    // what was on the wire.
    let value: i64 = std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| TorrentError::decode_error_at("integer out of range", start))?;

    *pos = end + 1;
    Ok(BencodeValue::with_span(BencodeKind::Integer(value), start..*pos))
}

fn decode_list(data: &[u8], pos: &mut usize, depth: usize) -> Result<BencodeValue> {
    let start = *pos;
    *pos += 1;

    let mut items = Vec::new();
    loop {
        match data.get(*pos) {
            None => {
                return Err(TorrentError::decode_error_at("missing terminating 'e' for list", start).into());
            }
            Some(b'e') => break,
            Some(_) => items.push(decode_value(data, pos, depth + 1)?),
        }
    }

    *pos += 1;
    Ok(BencodeValue::with_span(BencodeKind::List(items), start..*pos))
}

fn decode_dict(data: &[u8], pos: &mut usize, depth: usize) -> Result<BencodeValue> {
    let start = *pos;
    *pos += 1;

    let mut dict = BencodeDict::new();
    loop {
        match data.get(*pos) {
            None => {
                return Err(TorrentError::decode_error_at(
                    "missing terminating 'e' for dictionary",
                    start,
                )
                .into());
            }
            Some(b'e') => break,
            Some(_) => {
                let key_pos = *pos;
                let key = decode_value(data, pos, depth + 1)?;
                let key = match key.kind() {
                    BencodeKind::Bytes(b) => b.clone(),
                    _ => {
                        return Err(TorrentError::decode_error_at(
                            format!("dictionary key must be a byte string, got {}", key.type_name()),
                            key_pos,
                        )
                        .into());
                    }
                };

                if matches!(data.get(*pos), None | Some(b'e')) {
                    return Err(TorrentError::decode_error_at(
                        "truncated input: dictionary key without value",
                        key_pos,
                    )
                    .into());
                }
                let value = decode_value(data, pos, depth + 1)?;
                dict.insert(key, value);
            }
        }
    }

    *pos += 1;
    Ok(BencodeValue::with_span(BencodeKind::Dict(dict), start..*pos))
}
