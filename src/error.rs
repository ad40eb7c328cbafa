//! Error types for the piece fetcher
//!
//! Every failure is reported with the most specific kind so that the
//! command surface can classify it without inspecting messages.

use std::fmt;

/// Error type for all torrent operations
#[derive(Debug, Clone)]
pub enum TorrentError {
    /// Malformed bencode: bad length, missing delimiter, truncated input
    DecodeError {
        message: String,
        offset: Option<usize>,
    },

    /// Well-formed metadata missing a required field or holding the wrong variant
    StructuralError {
        message: String,
        field: Option<String>,
    },

    /// Connection failure, timeout, non-success HTTP status, short read or write
    NetworkError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },

    /// Unexpected message kind or ordering during handshake or piece retrieval
    ProtocolError {
        message: String,
        source: Option<String>,
    },

    /// Assembled piece does not hash to the expected value
    IntegrityError {
        piece_index: u32,
        expected: [u8; 20],
        actual: [u8; 20],
    },

    /// File I/O errors in the command shell
    StorageError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },
}

impl TorrentError {
    /// Create a new DecodeError at a byte offset of the input
    pub fn decode_error_at(message: impl Into<String>, offset: usize) -> Self {
        TorrentError::DecodeError {
            message: message.into(),
            offset: Some(offset),
        }
    }

    /// Create a new StructuralError
    pub fn structural_error(message: impl Into<String>) -> Self {
        TorrentError::StructuralError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new StructuralError naming the offending field
    pub fn structural_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::StructuralError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new NetworkError
    pub fn network_error(message: impl Into<String>) -> Self {
        TorrentError::NetworkError {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new NetworkError with address and source
    pub fn network_error_full(message: impl Into<String>, address: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ProtocolError
    pub fn protocol_error(message: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new ProtocolError with source
    pub fn protocol_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new IntegrityError
    pub fn integrity_error(piece_index: u32, expected: [u8; 20], actual: [u8; 20]) -> Self {
        TorrentError::IntegrityError {
            piece_index,
            expected,
            actual,
        }
    }

    /// Create a new StorageError with path and source
    pub fn storage_error_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match &mut self {
            TorrentError::NetworkError { source, .. }
            | TorrentError::ProtocolError { source, .. }
            | TorrentError::StorageError { source, .. } => {
                *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
            }
            TorrentError::DecodeError { message, .. }
            | TorrentError::StructuralError { message, .. }
            | TorrentError::ConfigError { message, .. } => {
                *message = format!("{} ({})", message, ctx);
            }
            TorrentError::IntegrityError { .. } => {}
        }
        self
    }

    /// Short name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            TorrentError::DecodeError { .. } => "decode",
            TorrentError::StructuralError { .. } => "structural",
            TorrentError::NetworkError { .. } => "network",
            TorrentError::ProtocolError { .. } => "protocol",
            TorrentError::IntegrityError { .. } => "integrity",
            TorrentError::StorageError { .. } => "storage",
            TorrentError::ConfigError { .. } => "config",
        }
    }

    /// Classify an `anyhow::Error` by the `TorrentError` it carries, if any
    pub fn kind_of(err: &anyhow::Error) -> Option<&'static str> {
        err.downcast_ref::<TorrentError>().map(TorrentError::kind)
    }
}

impl fmt::Display for TorrentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentError::DecodeError { message, offset } => {
                if let Some(pos) = offset {
                    write!(f, "Decode error: {} (offset: {})", message, pos)
                } else {
                    write!(f, "Decode error: {}", message)
                }
            }
            TorrentError::StructuralError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Structural error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Structural error: {}", message)
                }
            }
            TorrentError::NetworkError { message, address, source } => {
                match (address, source) {
                    (Some(a), Some(s)) => write!(f, "Network error: {} (address: {}, source: {})", message, a, s),
                    (Some(a), None) => write!(f, "Network error: {} (address: {})", message, a),
                    (None, Some(s)) => write!(f, "Network error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Network error: {}", message),
                }
            }
            TorrentError::ProtocolError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Protocol error: {} (source: {})", message, src)
                } else {
                    write!(f, "Protocol error: {}", message)
                }
            }
            TorrentError::IntegrityError { piece_index, expected, actual } => {
                write!(
                    f,
                    "Integrity error: piece {} hash mismatch (expected: {}, got: {})",
                    piece_index,
                    hex::encode(expected),
                    hex::encode(actual)
                )
            }
            TorrentError::StorageError { message, path, source } => {
                match (path, source) {
                    (Some(p), Some(s)) => write!(f, "Storage error: {} (path: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Storage error: {} (path: {})", message, p),
                    (None, Some(s)) => write!(f, "Storage error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Storage error: {}", message),
                }
            }
            TorrentError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for TorrentError {}

impl From<std::io::Error> for TorrentError {
    fn from(err: std::io::Error) -> Self {
        TorrentError::NetworkError {
            message: "I/O failure on peer stream".to_string(),
            address: None,
            source: Some(format!("{}: {}", err.kind(), err)),
        }
    }
}

impl From<reqwest::Error> for TorrentError {
    fn from(err: reqwest::Error) -> Self {
        let address = err.url().map(|u| u.to_string());
        TorrentError::NetworkError {
            message: if err.is_timeout() {
                "Tracker request timed out".to_string()
            } else if err.is_status() {
                "Tracker returned a non-success status".to_string()
            } else {
                "Tracker request failed".to_string()
            },
            address,
            source: Some(err.to_string()),
        }
    }
}

impl From<std::net::AddrParseError> for TorrentError {
    fn from(err: std::net::AddrParseError) -> Self {
        TorrentError::ConfigError {
            message: format!("Failed to parse peer address: {}", err),
            field: Some("peer".to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for TorrentError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        TorrentError::network_error("Connection timeout").with_context(err.to_string())
    }
}
