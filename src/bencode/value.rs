//! Bencode value tree
//!
//! Every decoded value remembers the byte range of the input it came from,
//! so consumers can hash or slice the original encoding without rebuilding it.

use std::collections::BTreeMap;
use std::ops::Range;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// Dictionary keyed by raw bytes. `BTreeMap<Vec<u8>, _>` orders keys by
/// byte value, which is the canonical bencode order.
pub type BencodeDict = BTreeMap<Vec<u8>, BencodeValue>;

/// The four bencode variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeKind {
    Bytes(Vec<u8>),
    Integer(i64),
    List(Vec<BencodeValue>),
    Dict(BencodeDict),
}

/// A bencode value plus the span of input it was decoded from
#[derive(Debug, Clone)]
pub struct BencodeValue {
    kind: BencodeKind,
    span: Range<usize>,
}

impl BencodeValue {
    pub(crate) fn with_span(kind: BencodeKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }

    /// Build a byte string value that was not decoded from any input
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_span(BencodeKind::Bytes(bytes.into()), 0..0)
    }

    /// Build an integer value that was not decoded from any input
    pub fn integer(value: i64) -> Self {
        Self::with_span(BencodeKind::Integer(value), 0..0)
    }

    /// Build a list value that was not decoded from any input
    pub fn list(items: Vec<BencodeValue>) -> Self {
        Self::with_span(BencodeKind::List(items), 0..0)
    }

    /// Build a dictionary value from `(key, value)` pairs; later keys win
    pub fn dict<K: Into<Vec<u8>>>(entries: impl IntoIterator<Item = (K, BencodeValue)>) -> Self {
        let dict = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::with_span(BencodeKind::Dict(dict), 0..0)
    }

    /// The variant tag and its contents
    pub fn kind(&self) -> &BencodeKind {
        &self.kind
    }

    /// Byte range of the source input this value was decoded from.
    ///
    /// Values built with the constructors above have an empty span.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.kind {
            BencodeKind::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Byte string as UTF-8 text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match &self.kind {
            BencodeKind::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match &self.kind {
            BencodeKind::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BencodeDict> {
        match &self.kind {
            BencodeKind::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Look up a key when this value is a dictionary
    pub fn get(&self, key: &[u8]) -> Option<&BencodeValue> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Name of the variant, for error messages
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            BencodeKind::Bytes(_) => "byte string",
            BencodeKind::Integer(_) => "integer",
            BencodeKind::List(_) => "list",
            BencodeKind::Dict(_) => "dictionary",
        }
    }

    /// Present this value as JSON: strings lossily as UTF-8, dictionaries
    /// keyed in byte order
    pub fn to_json(&self) -> serde_json::Value {
        // Every map key is serialized as a string, so this cannot fail
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Structural equality: spans are ignored, so a value decoded from a larger
/// buffer equals the same value decoded on its own.
impl PartialEq for BencodeValue {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for BencodeValue {}

impl Serialize for BencodeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.kind {
            BencodeKind::Bytes(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
            BencodeKind::Integer(i) => serializer.serialize_i64(*i),
            BencodeKind::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            BencodeKind::Dict(dict) => {
                let mut map = serializer.serialize_map(Some(dict.len()))?;
                for (k, v) in dict {
                    map.serialize_entry(&String::from_utf8_lossy(k), v)?;
                }
                map.end()
            }
        }
    }
}
