//! Bencode module
//!
//! Decoding with exact span tracking, canonical encoding and JSON presentation.

pub mod decode;
pub mod encode;
pub mod value;

pub use decode::{decode, decode_all, MAX_DEPTH};
pub use encode::encode;
pub use value::{BencodeDict, BencodeKind, BencodeValue};
