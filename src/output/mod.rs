//! Output module for run reports
//!
//! This module handles:
//! - Printing run statistics
//! - Summarizing extracted items and failures per source

pub mod stats;

pub use stats::{format_statistics, print_statistics};

use crate::crawler::RunReport;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Formats the per-source part of a run report
///
/// Sources are listed alphabetically with their item count, followed by
/// every failure.
pub fn format_report(report: &RunReport) -> String {
    let mut out = String::new();

    let mut per_source: BTreeMap<&str, usize> = BTreeMap::new();
    for item in &report.items {
        *per_source.entry(item.source_name.as_str()).or_insert(0) += 1;
    }

    let _ = writeln!(out, "Items ({}):", report.items.len());
    for (source, count) in &per_source {
        let _ = writeln!(out, "  {}: {}", source, count);
    }

    if !report.failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failures ({}):", report.failures.len());
        for failure in &report.failures {
            match &failure.url {
                Some(url) => {
                    let _ = writeln!(
                        out,
                        "  [{}] {} {}: {}",
                        failure.stage, failure.source, url, failure.error
                    );
                }
                None => {
                    let _ = writeln!(
                        out,
                        "  [{}] {}: {}",
                        failure.stage, failure.source, failure.error
                    );
                }
            }
        }
    }

    out
}

/// Prints a run report followed by its statistics
pub fn print_report(report: &RunReport) {
    println!("{}", format_report(report));
    print_statistics(&report.stats);
}
