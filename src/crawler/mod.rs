//! Crawler module for polite concurrent fetching and parsing
//!
//! This module contains the core aggregation logic, including:
//! - A generic fixed-size worker pool
//! - Per-domain token-bucket rate limiting
//! - HTTP fetching behind robots.txt and rate checks
//! - Content parsers and their registry
//! - The coordinator that wires fetch and parse pools together

mod coordinator;
mod fetcher;
mod limiter;
mod parser;
mod pool;

pub use coordinator::Coordinator;
pub use fetcher::{build_http_client, Fetcher};
pub use limiter::{RateLimiter, TokenBucket, DEFAULT_REQUESTS_PER_MINUTE};
pub use parser::{parse_blocking, HtmlParser, Parser, ParserRegistry};
pub use pool::WorkerPool;

use crate::config::Config;
use crate::model::{Item, Stats};
use crate::{AggregatorError, Result};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Pipeline stage a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Parse,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => f.write_str("fetch"),
            Self::Parse => f.write_str("parse"),
        }
    }
}

/// A failed fetch or parse, as reported to the caller
#[derive(Debug)]
pub struct Failure {
    pub stage: Stage,
    pub source: String,
    /// The fetched URL (fetch failures only)
    pub url: Option<String>,
    pub error: AggregatorError,
}

/// Everything one aggregation run produced
#[derive(Debug)]
pub struct RunReport {
    pub stats: Stats,
    pub items: Vec<Item>,
    pub failures: Vec<Failure>,
}

/// Runs a complete aggregation over every enabled source
///
/// This is the main entry point used by the CLI. It will:
/// 1. Resolve every page URL of every enabled source
/// 2. Start the coordinator and submit the jobs from a background task
/// 3. Collect fetch and parse results until every job is accounted for
/// 4. Stop the coordinator and return the report
///
/// Cancelling `token` ends collection early; the report then holds whatever
/// arrived before cancellation.
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `token` - Cancels the whole run
///
/// # Returns
///
/// * `Ok(RunReport)` - Collected items, failures and statistics
/// * `Err(AggregatorError)` - The run could not be set up
///
/// # Example
///
/// ```no_run
/// use web_aggregator::config::load_config;
/// use web_aggregator::crawler::run_aggregation;
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("aggregator.toml"))?;
/// let report = run_aggregation(config, CancellationToken::new()).await?;
/// println!("{} items", report.items.len());
/// # Ok(())
/// # }
/// ```
pub async fn run_aggregation(config: Config, token: CancellationToken) -> Result<RunReport> {
    let coordinator = Arc::new(Coordinator::new(Arc::new(config))?);

    // A bad template fails the run before any worker starts
    let sources = coordinator.config().enabled_sources();
    let mut expected_fetches = 0;
    for source in &sources {
        expected_fetches += source.page_urls()?.len();
    }
    info!(jobs = expected_fetches, "Starting aggregation");

    let mut fetch_results = coordinator
        .take_fetch_results()
        .ok_or(AggregatorError::QueueClosed("fetch result"))?;
    let mut parse_results = coordinator
        .take_parse_results()
        .ok_or(AggregatorError::QueueClosed("parse result"))?;

    coordinator.start(&token)?;

    let submitter = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            for source in sources {
                if let Err(e) = coordinator.submit_source_pages(source).await {
                    if !e.is_cancelled() {
                        warn!(error = %e, "Stopped submitting jobs");
                    }
                    break;
                }
            }
        })
    };

    let mut items = Vec::new();
    let mut failures = Vec::new();
    let mut fetches_done = 0;
    let mut parses_expected = 0;
    let mut parses_done = 0;

    while fetches_done < expected_fetches || parses_done < parses_expected {
        tokio::select! {
            _ = token.cancelled() => {
                info!("Aggregation cancelled");
                break;
            }
            Some(result) = fetch_results.recv(), if fetches_done < expected_fetches => {
                fetches_done += 1;
                if result.is_success() {
                    parses_expected += 1;
                } else if let Some(error) = result.error {
                    failures.push(Failure {
                        stage: Stage::Fetch,
                        source: result.source.name.clone(),
                        url: Some(result.url.to_string()),
                        error,
                    });
                }
            }
            Some(result) = parse_results.recv(), if parses_done < parses_expected => {
                parses_done += 1;
                match result.error {
                    None => items.extend(result.items),
                    Some(error) => failures.push(Failure {
                        stage: Stage::Parse,
                        source: result.source.name.clone(),
                        url: None,
                        error,
                    }),
                }
            }
            else => break,
        }
    }

    coordinator.stop().await;
    if let Err(e) = submitter.await {
        warn!(error = %e, "Job submitter task failed");
    }

    let stats = coordinator.stats();
    info!(
        items = items.len(),
        failures = failures.len(),
        "Aggregation finished"
    );

    Ok(RunReport {
        stats,
        items,
        failures,
    })
}
