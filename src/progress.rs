//! Scan statistics and progress reporting
//!
//! [`ScanStats`] is the shared counter block every worker bumps through
//! relaxed atomics. The reporter renders a live spinner line; header
//! and summary printing live here too.

use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Shared scan counters
#[derive(Debug, Default)]
pub struct ScanStats {
    /// Hosts completed successfully (including partial-after-timeout)
    pub success: AtomicU64,
    /// Hosts that failed (resolution, probe, connect, listing)
    pub errors: AtomicU64,

    pub shares_total: AtomicU64,
    pub shares_processed: AtomicU64,
    pub shares_skipped: AtomicU64,

    pub files_total: AtomicU64,
    pub files_processed: AtomicU64,
    pub files_skipped: AtomicU64,

    pub dirs_total: AtomicU64,
    pub dirs_processed: AtomicU64,
    pub dirs_skipped: AtomicU64,

    /// Hosts currently being processed
    pub active_hosts: AtomicI64,
}

impl ScanStats {
    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn host_started(&self) {
        self.active_hosts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn host_finished(&self) {
        self.active_hosts.fetch_sub(1, Ordering::Relaxed);
    }

    /// Hosts finished either way
    pub fn hosts_done(&self) -> u64 {
        self.success.load(Ordering::Relaxed) + self.errors.load(Ordering::Relaxed)
    }
}

/// Per-share traversal counters, merged into [`ScanStats`] when a share
/// sub-task finishes
#[derive(Debug, Default, Clone, Copy)]
pub struct TraversalCounts {
    pub files_total: u64,
    pub files_skipped: u64,
    pub files_processed: u64,
    pub dirs_total: u64,
    pub dirs_skipped: u64,
    pub dirs_processed: u64,
}

impl TraversalCounts {
    pub fn add(&mut self, other: TraversalCounts) {
        self.files_total += other.files_total;
        self.files_skipped += other.files_skipped;
        self.files_processed += other.files_processed;
        self.dirs_total += other.dirs_total;
        self.dirs_skipped += other.dirs_skipped;
        self.dirs_processed += other.dirs_processed;
    }

    pub fn merge_into(&self, stats: &ScanStats) {
        stats
            .files_total
            .fetch_add(self.files_total + self.files_skipped, Ordering::Relaxed);
        stats
            .files_processed
            .fetch_add(self.files_processed, Ordering::Relaxed);
        stats
            .files_skipped
            .fetch_add(self.files_skipped, Ordering::Relaxed);
        stats
            .dirs_total
            .fetch_add(self.dirs_total + self.dirs_skipped, Ordering::Relaxed);
        stats
            .dirs_processed
            .fetch_add(self.dirs_processed, Ordering::Relaxed);
        stats
            .dirs_skipped
            .fetch_add(self.dirs_skipped, Ordering::Relaxed);
    }
}

/// Spinner-based live status line
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Render the stats into the status line
    pub fn update(&self, stats: &ScanStats, total_targets: u64) {
        let msg = format!(
            "Hosts: {}/{} | Active: {} | Shares: {} | Dirs: {} | Files: {} | Errors: {}",
            format_number(stats.hosts_done()),
            format_number(total_targets),
            stats.active_hosts.load(Ordering::Relaxed).max(0),
            format_number(stats.shares_processed.load(Ordering::Relaxed)),
            format_number(stats.dirs_processed.load(Ordering::Relaxed)),
            format_number(stats.files_processed.load(Ordering::Relaxed)),
            format_number(stats.errors.load(Ordering::Relaxed)),
        );
        self.bar.set_message(msg);
    }

    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();
    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();
    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of the scan
pub fn print_header(targets: usize, threads: usize, output: &str) {
    println!();
    println!(
        "{} {}",
        style("smb-walker").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Targets:").bold(), format_number(targets as u64));
    println!("  {} {}", style("Threads:").bold(), threads);
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}

/// Print the final summary
pub fn print_summary(stats: &ScanStats, duration: Duration, output: &str, output_size: Option<u64>) {
    let success = stats.success.load(Ordering::Relaxed);
    let errors = stats.errors.load(Ordering::Relaxed);

    println!();
    println!("{}", style("Scan Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Hosts OK:").bold(), format_number(success));
    if errors > 0 {
        println!(
            "  {} {}",
            style("Hosts failed:").yellow().bold(),
            format_number(errors)
        );
    }
    println!(
        "  {} {} processed / {} skipped",
        style("Shares:").bold(),
        format_number(stats.shares_processed.load(Ordering::Relaxed)),
        format_number(stats.shares_skipped.load(Ordering::Relaxed)),
    );
    println!(
        "  {} {} processed / {} skipped",
        style("Directories:").bold(),
        format_number(stats.dirs_processed.load(Ordering::Relaxed)),
        format_number(stats.dirs_skipped.load(Ordering::Relaxed)),
    );
    println!(
        "  {} {} processed / {} skipped",
        style("Files:").bold(),
        format_number(stats.files_processed.load(Ordering::Relaxed)),
        format_number(stats.files_skipped.load(Ordering::Relaxed)),
    );
    println!(
        "  {} {:.1}s",
        style("Duration:").bold(),
        duration.as_secs_f64()
    );
    if let Some(size) = output_size {
        println!(
            "  {} {} ({})",
            style("Output:").bold(),
            output,
            format_size(size, BINARY)
        );
    } else {
        println!("  {} {}", style("Output:").bold(), output);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_traversal_counts_merge() {
        let stats = ScanStats::default();
        let counts = TraversalCounts {
            files_total: 10,
            files_skipped: 2,
            files_processed: 8,
            dirs_total: 3,
            dirs_skipped: 1,
            dirs_processed: 2,
        };
        counts.merge_into(&stats);

        assert_eq!(stats.files_total.load(Ordering::Relaxed), 12);
        assert_eq!(stats.files_processed.load(Ordering::Relaxed), 8);
        assert_eq!(stats.dirs_total.load(Ordering::Relaxed), 4);
        assert_eq!(stats.dirs_skipped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_hosts_done() {
        let stats = ScanStats::default();
        stats.record_success();
        stats.record_success();
        stats.record_error();
        assert_eq!(stats.hosts_done(), 3);
    }
}
