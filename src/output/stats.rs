//! Run statistics display
//!
//! Formats the coordinator's counters for the terminal.

use crate::model::Stats;
use std::fmt::Write;

/// Formats statistics as a human-readable block
pub fn format_statistics(stats: &Stats) -> String {
    let mut out = String::new();
    let duration = stats.duration();

    // Writing into a String cannot fail
    let _ = writeln!(out, "=== Aggregation Statistics ===\n");
    let _ = writeln!(out, "Sources:");
    let _ = writeln!(out, "  Submitted: {}", stats.total_sources);
    let _ = writeln!(out, "  Processed: {}", stats.processed_sources);
    let _ = writeln!(out);

    let _ = writeln!(out, "Fetches:");
    let _ = writeln!(out, "  Successful: {}", stats.successful_fetches);
    let _ = writeln!(out, "  Failed: {}", stats.failed_fetches);
    let _ = writeln!(out);

    let _ = writeln!(out, "Parses:");
    let _ = writeln!(out, "  Successful: {}", stats.successful_parses);
    let _ = writeln!(out, "  Failed: {}", stats.failed_parses);
    let _ = writeln!(out);

    let _ = writeln!(out, "Started: {}", stats.started_at.to_rfc3339());
    if let Some(finished) = stats.finished_at {
        let _ = writeln!(out, "Finished: {}", finished.to_rfc3339());
    }
    let _ = writeln!(out, "Duration: {:.2}s", duration.as_secs_f64());
    let _ = write!(
        out,
        "Success Rate: {:.1}% ({} / {} fetches succeeded)",
        stats.fetch_success_rate(),
        stats.successful_fetches,
        stats.processed_sources
    );

    out
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &Stats) {
    println!("{}", format_statistics(stats));
}
