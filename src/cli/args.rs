//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::peer::DEFAULT_CONNECT_TIMEOUT;
use crate::tracker::DEFAULT_TRACKER_TIMEOUT;

/// CLI arguments for the piece fetcher
#[derive(Debug, Parser)]
#[command(name = "piece-fetch")]
#[command(about = "Inspect torrents and fetch verified pieces from a single peer", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Port reported to the tracker
    #[arg(short, long, global = true, default_value_t = 6881)]
    pub port: u16,

    /// Seconds allowed for connect plus handshake
    #[arg(long, global = true, default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs(), value_name = "SECS")]
    pub connect_timeout: u64,

    /// Seconds allowed for the tracker request
    #[arg(long, global = true, default_value_t = DEFAULT_TRACKER_TIMEOUT.as_secs(), value_name = "SECS")]
    pub tracker_timeout: u64,

    /// Peer id to present (20 bytes); random when omitted
    #[arg(long, global = true, value_name = "ID")]
    pub peer_id: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode a bencoded value and print it as JSON
    Decode {
        #[arg(value_name = "VALUE")]
        value: String,
    },

    /// Print tracker URL, length, info hash and piece hashes
    Info {
        #[arg(value_name = "TORRENT_FILE")]
        torrent_file: PathBuf,
    },

    /// Ask the tracker for peers
    Peers {
        #[arg(value_name = "TORRENT_FILE")]
        torrent_file: PathBuf,
    },

    /// Handshake with one peer and print its peer id
    Handshake {
        #[arg(value_name = "TORRENT_FILE")]
        torrent_file: PathBuf,
        /// Peer address as ip:port
        #[arg(value_name = "PEER")]
        peer: String,
    },

    /// Download and verify a single piece
    #[command(name = "download_piece")]
    DownloadPiece {
        /// Where to write the piece
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        #[arg(value_name = "TORRENT_FILE")]
        torrent_file: PathBuf,
        #[arg(value_name = "PIECE_INDEX")]
        piece_index: u32,
        /// Use this peer instead of asking the tracker
        #[arg(long, value_name = "PEER")]
        peer: Option<String>,
    },

    /// Download the whole file, piece by piece, from one peer
    Download {
        /// Where to write the file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        #[arg(value_name = "TORRENT_FILE")]
        torrent_file: PathBuf,
        /// Use this peer instead of asking the tracker
        #[arg(long, value_name = "PEER")]
        peer: Option<String>,
    },
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}
