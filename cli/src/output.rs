//! Output formatting for CLI commands

use colored::Colorize;
use packetlog_aggregator::FlushReport;
use std::path::Path;

pub fn storage_ready(path: &Path) {
    println!("{} storage ready at {}", "✓".green(), path.display().to_string().bold());
}

pub fn collecting(data_dir: &Path, flush_seconds: u64) {
    eprintln!(
        "{} collecting into {} (flush every {}s, Ctrl-C to stop)",
        "ℹ".blue(),
        data_dir.display(),
        flush_seconds
    );
}

pub fn summary(ingested: u64, rejected: u64, last: &FlushReport) {
    eprintln!(
        "{} {} events recorded, final window: {} rows / {} events",
        "✓".green(),
        ingested,
        last.rows,
        last.events
    );
    if rejected > 0 {
        eprintln!("{} {} malformed lines skipped", "⚠".yellow(), rejected);
    }
}
