//! CLI configuration module
//!
//! Runtime settings resolved from the command line.

use crate::cli::args::CliArgs;
use crate::error::TorrentError;
use crate::protocol::Handshake;
use std::time::Duration;
use anyhow::Result;

/// Configuration for the piece fetcher
#[derive(Debug, Clone)]
pub struct Config {
    /// Port reported to the tracker
    pub port: u16,
    /// Bound on connect plus handshake
    pub connect_timeout: Duration,
    /// Bound on the tracker request
    pub tracker_timeout: Duration,
    /// Peer id we present; must be 20 bytes
    pub peer_id: Vec<u8>,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Self {
        let peer_id = match &args.peer_id {
            Some(id) => id.as_bytes().to_vec(),
            None => Handshake::generate_peer_id().to_vec(),
        };

        Self {
            port: args.port,
            connect_timeout: Duration::from_secs(args.connect_timeout),
            tracker_timeout: Duration::from_secs(args.tracker_timeout),
            peer_id,
            verbose: args.verbose,
            quiet: args.quiet,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(TorrentError::config_error_with_field("Port cannot be 0", "port").into());
        }

        if self.connect_timeout.is_zero() {
            return Err(TorrentError::config_error_with_field("Timeout must be positive", "connect_timeout").into());
        }

        if self.tracker_timeout.is_zero() {
            return Err(TorrentError::config_error_with_field("Timeout must be positive", "tracker_timeout").into());
        }

        if self.peer_id.len() != 20 {
            return Err(TorrentError::config_error_with_field(
                format!("Peer id must be 20 bytes, got {}", self.peer_id.len()),
                "peer_id",
            )
            .into());
        }

        Ok(())
    }

    /// Peer id as the fixed-size array the protocol carries
    pub fn peer_id(&self) -> Result<[u8; 20]> {
        self.peer_id.as_slice().try_into().map_err(|_| {
            TorrentError::config_error_with_field(
                format!("Peer id must be 20 bytes, got {}", self.peer_id.len()),
                "peer_id",
            )
            .into()
        })
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}
