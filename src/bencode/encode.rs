//! Canonical bencode encoder
//!
//! Dictionary keys are written in raw byte order. A decoded value does not
//! always re-encode to its original bytes (unsorted keys, leading zeros);
//! hash the decoded span, not a re-encoding.

use bytes::{BufMut, BytesMut};

use super::value::{BencodeKind, BencodeValue};

/// Encode a value into canonical bencode
pub fn encode(value: &BencodeValue) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf);
    buf.to_vec()
}

fn encode_into(value: &BencodeValue, buf: &mut BytesMut) {
    match value.kind() {
        BencodeKind::Bytes(bytes) => put_bytes(buf, bytes),
        BencodeKind::Integer(i) => {
            buf.put_u8(b'i');
            buf.put_slice(i.to_string().as_bytes());
            buf.put_u8(b'e');
        }
        BencodeKind::List(items) => {
            buf.put_u8(b'l');
            for item in items {
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
        BencodeKind::Dict(dict) => {
            buf.put_u8(b'd');
            // BTreeMap<Vec<u8>, _> iterates in byte order
            for (key, val) in dict {
                put_bytes(buf, key);
                encode_into(val, buf);
            }
            buf.put_u8(b'e');
        }
    }
}

fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_slice(bytes.len().to_string().as_bytes());
    buf.put_u8(b':');
    buf.put_slice(bytes);
}
