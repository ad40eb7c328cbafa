//! Progress display module
//!
//! Per-piece progress for the `download` command. Written to stderr so the
//! command's stdout stays clean.

use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Running totals of a sequential download
#[derive(Debug, Clone, Default)]
pub struct DownloadStats {
    /// Pieces verified so far
    pub pieces_done: usize,
    /// Pieces in the torrent
    pub total_pieces: usize,
    /// Verified bytes so far
    pub downloaded: u64,
    /// Content length
    pub total_bytes: u64,
}

impl DownloadStats {
    pub fn new(total_pieces: usize, total_bytes: u64) -> Self {
        Self {
            total_pieces,
            total_bytes,
            ..Self::default()
        }
    }

    /// Count one verified piece
    pub fn record_piece(&mut self, size: usize) {
        self.pieces_done += 1;
        self.downloaded += size as u64;
    }

    /// Fraction of bytes done (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_bytes == 0 {
            if self.pieces_done >= self.total_pieces { 1.0 } else { 0.0 }
        } else {
            self.downloaded as f64 / self.total_bytes as f64
        }
    }

    /// Format bytes to human readable string
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_index])
    }

    /// Format speed to human readable string
    pub fn format_speed(bytes_per_sec: f64) -> String {
        format!("{}/s", Self::format_bytes(bytes_per_sec as u64))
    }

    /// Format duration to human readable string
    pub fn format_duration(duration: Duration) -> String {
        let total_secs = duration.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Average speed over `elapsed`
    pub fn speed(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.downloaded as f64 / secs
        }
    }
}

/// Progress display for CLI
pub struct ProgressDisplay {
    /// Start time of the download
    start_time: Instant,
    /// Quiet mode (no progress output)
    quiet: bool,
}

impl ProgressDisplay {
    /// Create a new progress display
    pub fn new(quiet: bool) -> Self {
        Self {
            start_time: Instant::now(),
            quiet,
        }
    }

    /// One line describing where the download stands
    pub fn render(stats: &DownloadStats, elapsed: Duration) -> String {
        format!(
            "Piece {}/{} | {} / {} ({:.1}%) | {}",
            stats.pieces_done,
            stats.total_pieces,
            DownloadStats::format_bytes(stats.downloaded),
            DownloadStats::format_bytes(stats.total_bytes),
            stats.progress() * 100.0,
            DownloadStats::format_speed(stats.speed(elapsed)),
        )
    }

    /// Report a freshly verified piece
    pub fn piece_done(&self, stats: &DownloadStats) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        let mut stderr = io::stderr().lock();
        writeln!(stderr, "{}", Self::render(stats, self.start_time.elapsed()))?;
        stderr.flush()
    }

    /// Print completion message
    pub fn print_complete(&self, stats: &DownloadStats) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        let mut stderr = io::stderr().lock();
        writeln!(
            stderr,
            "Download complete: {} in {} pieces, {}",
            DownloadStats::format_bytes(stats.downloaded),
            stats.pieces_done,
            DownloadStats::format_duration(self.start_time.elapsed())
        )?;
        stderr.flush()
    }
}
