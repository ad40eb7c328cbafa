//! piece-fetch - Main entry point
//!
//! Inspect torrents, talk to trackers and peers, and fetch verified pieces.

use anyhow::{Context, Result};
use piece_fetch::{
    bencode, download_file, download_piece_from, AnnounceRequest, CliArgs, Command, Config, DownloadStats,
    HttpTracker, PeerConnection, PeerEndpoint, PeerSource, ProgressDisplay, TorrentError, TorrentInfo,
    TorrentParser,
};
use std::path::Path;
use tracing::{debug, error, info};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();
        if let Some(location) = panic_info.location() {
            error!("PANIC occurred at {}:{}:{}", location.file(), location.line(), location.column());
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    debug!("CLI arguments: {:?}", args);

    let config = Config::from_args(&args);
    config.validate().context("Invalid configuration")?;

    let result = match args.command {
        Command::Decode { value } => run_decode(&value),
        Command::Info { torrent_file } => run_info(&torrent_file),
        Command::Peers { torrent_file } => run_peers(&torrent_file, &config).await,
        Command::Handshake { torrent_file, peer } => run_handshake(&torrent_file, &peer, &config).await,
        Command::DownloadPiece { output, torrent_file, piece_index, peer } => {
            run_download_piece(&torrent_file, piece_index, &output, peer.as_deref(), &config).await
        }
        Command::Download { output, torrent_file, peer } => {
            run_download(&torrent_file, &output, peer.as_deref(), &config).await
        }
    };

    if let Err(e) = &result {
        error!("Command failed ({}): {:#}", TorrentError::kind_of(e).unwrap_or("other"), e);
    }
    result
}

/// Initialize logging based on verbosity settings.
///
/// Logs go to stderr; stdout carries command output only.
fn init_logging(args: &CliArgs) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }

    debug!("Logging initialized with level {:?}", args.log_level());
}

/// Load and parse the torrent file
fn load_torrent_file(path: &Path) -> Result<TorrentInfo> {
    info!("Loading torrent file: {}", path.display());
    let torrent = TorrentParser::parse_file(path)
        .with_context(|| format!("Failed to load torrent file '{}'", path.display()))?;
    debug!("Torrent has {} pieces, info hash {}", torrent.piece_count(), torrent.info_hash_hex());
    Ok(torrent)
}

fn run_decode(value: &str) -> Result<()> {
    let decoded = bencode::decode_all(value.as_bytes()).context("Failed to decode value")?;
    println!("{}", decoded.to_json());
    Ok(())
}

fn run_info(path: &Path) -> Result<()> {
    let torrent = load_torrent_file(path)?;

    println!("Tracker URL: {}", torrent.announce);
    println!("Length: {}", torrent.length);
    println!("Info Hash: {}", torrent.info_hash_hex());
    println!("Piece Length: {}", torrent.piece_length);
    println!("Piece Hashes:");
    for hash in torrent.piece_hashes_hex() {
        println!("{}", hash);
    }
    Ok(())
}

async fn announce(torrent: &TorrentInfo, config: &Config) -> Result<Vec<PeerEndpoint>> {
    let tracker = HttpTracker::new(&torrent.announce, config.tracker_timeout)?;
    let request = AnnounceRequest::new(torrent, config.peer_id()?, config.port);
    let response = tracker.announce(&request).await.context("Tracker announce failed")?;
    info!("Tracker returned {} peers", response.peers.len());
    Ok(response.peers)
}

async fn run_peers(path: &Path, config: &Config) -> Result<()> {
    let torrent = load_torrent_file(path)?;
    for peer in announce(&torrent, config).await? {
        println!("{}", peer);
    }
    Ok(())
}

async fn run_handshake(path: &Path, peer: &str, config: &Config) -> Result<()> {
    let torrent = load_torrent_file(path)?;
    let endpoint: PeerEndpoint = peer.parse()?;

    let connection =
        PeerConnection::connect(endpoint, torrent.info_hash, config.peer_id()?, config.connect_timeout).await?;
    println!("Peer ID: {}", hex::encode(connection.remote_peer_id()));
    connection.close().await
}

/// The peer given on the command line, or the first one the tracker knows
async fn resolve_peer(torrent: &TorrentInfo, peer: Option<&str>, config: &Config) -> Result<PeerEndpoint> {
    if let Some(peer) = peer {
        return Ok(peer.parse()?);
    }

    let peers = announce(torrent, config).await?;
    let first = peers
        .first()
        .copied()
        .ok_or_else(|| TorrentError::protocol_error("Tracker returned no peers"))?;
    info!("Using peer {}", first);
    Ok(first)
}

async fn write_output(output: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(output, bytes).await.map_err(|e| {
        error!("Failed to write '{}': {}", output.display(), e);
        TorrentError::storage_error_full("Failed to write output", output.display().to_string(), e.to_string())
    })?;
    Ok(())
}

async fn run_download_piece(
    path: &Path,
    piece_index: u32,
    output: &Path,
    peer: Option<&str>,
    config: &Config,
) -> Result<()> {
    let torrent = load_torrent_file(path)?;
    let endpoint = resolve_peer(&torrent, peer, config).await?;

    let piece = download_piece_from(&torrent, piece_index, endpoint, config.peer_id()?, config.connect_timeout)
        .await
        .with_context(|| format!("Failed to download piece {}", piece_index))?;

    write_output(output, &piece).await?;
    println!("Piece {} downloaded to {}.", piece_index, output.display());
    Ok(())
}

async fn run_download(path: &Path, output: &Path, peer: Option<&str>, config: &Config) -> Result<()> {
    let torrent = load_torrent_file(path)?;
    let endpoint = resolve_peer(&torrent, peer, config).await?;

    let progress = ProgressDisplay::new(config.is_quiet());
    let mut stats = DownloadStats::new(torrent.piece_count(), torrent.total_size());

    let file = download_file(&torrent, endpoint, config.peer_id()?, config.connect_timeout, |index, size| {
        stats.record_piece(size);
        debug!("Piece {} verified ({} bytes)", index, size);
        if let Err(e) = progress.piece_done(&stats) {
            debug!("Progress output failed: {}", e);
        }
    })
    .await
    .context("Download failed")?;

    write_output(output, &file).await?;
    progress.print_complete(&stats)?;
    println!("Downloaded {} to {}.", path.display(), output.display());
    Ok(())
}
