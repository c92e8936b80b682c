use chrono::{DateTime, Utc};
use std::time::Duration;

/// Aggregate counters for one coordinator run
///
/// Counters are updated by the workers next to the event they count, so
/// `processed_sources == successful_fetches + failed_fetches` holds whenever
/// the stats are read under the coordinator's lock.
///
/// A fetch or parse is counted when it completes, before its result is pushed.
/// If the run is cancelled while that push is blocked on a full queue, the
/// result is dropped but stays counted, so the counters can exceed what
/// result consumers received.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    /// Number of fetch jobs submitted
    pub total_sources: usize,

    /// Number of fetch jobs that produced a result
    pub processed_sources: usize,

    pub successful_fetches: usize,

    pub failed_fetches: usize,

    pub successful_parses: usize,

    pub failed_parses: usize,

    pub started_at: DateTime<Utc>,

    /// Set once the coordinator has stopped
    pub finished_at: Option<DateTime<Utc>>,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            total_sources: 0,
            processed_sources: 0,
            successful_fetches: 0,
            failed_fetches: 0,
            successful_parses: 0,
            failed_parses: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record_submitted(&mut self) {
        self.total_sources += 1;
    }

    /// Records a fetch outcome; every fetch result counts as processed
    pub fn record_fetch(&mut self, success: bool) {
        self.processed_sources += 1;
        if success {
            self.successful_fetches += 1;
        } else {
            self.failed_fetches += 1;
        }
    }

    pub fn record_parse(&mut self, success: bool) {
        if success {
            self.successful_parses += 1;
        } else {
            self.failed_parses += 1;
        }
    }

    pub fn mark_finished(&mut self) {
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    /// Time elapsed between start and finish (or now, while still running)
    pub fn duration(&self) -> Duration {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Fraction of processed fetches that succeeded, in percent
    pub fn fetch_success_rate(&self) -> f64 {
        if self.processed_sources == 0 {
            return 0.0;
        }
        self.successful_fetches as f64 / self.processed_sources as f64 * 100.0
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}
