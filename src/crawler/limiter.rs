//! Per-domain rate limiting
//!
//! Each domain gets a token bucket sized to its requests-per-minute budget.
//! Buckets start full, so a domain can burst up to its budget before being
//! throttled to the steady rate.

use crate::config::Config;
use crate::{AggregatorError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Delay between attempts to take a token
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Requests per minute when the configuration does not say otherwise
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 30;

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

/// A token bucket for one domain
///
/// The token count never exceeds capacity. Refill only moves the timestamp
/// when at least one whole token was added, so fractional progress carries
/// over between calls.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    /// Tokens added per second
    rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket
    pub fn new(capacity: u32, rate: f64) -> Self {
        Self {
            capacity,
            rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Creates a full bucket refilling at `rpm / 60` tokens per second
    pub fn per_minute(rpm: u32) -> Self {
        Self::new(rpm, f64::from(rpm) / 60.0)
    }

    /// Takes one token if available; never blocks
    pub fn take(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);

        if state.tokens > 0 {
            state.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Current token count, after refilling
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        let to_add = (elapsed * self.rate) as u64;

        if to_add > 0 {
            let tokens = (u64::from(state.tokens) + to_add).min(u64::from(self.capacity));
            state.tokens = tokens as u32;
            state.last_refill = now;
        }
    }
}

/// Hands out request permission per domain
///
/// The bucket map has its own lock; each bucket locks separately, so a
/// lookup for one domain never waits on another domain's refill.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
    default_rpm: u32,
    overrides: HashMap<String, u32>,
}

impl RateLimiter {
    /// Creates a limiter with a default budget and per-domain overrides
    ///
    /// # Arguments
    ///
    /// * `default_rpm` - Requests per minute for domains without an override
    /// * `overrides` - Requests per minute keyed by `host[:port]`
    pub fn new(default_rpm: u32, overrides: HashMap<String, u32>) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            default_rpm: default_rpm.max(1),
            overrides,
        }
    }

    /// Builds a limiter from the crawler default and every source's override
    ///
    /// When several sources on the same host set an override, the first one
    /// in configuration order wins.
    pub fn from_config(config: &Config) -> Self {
        let mut overrides = HashMap::new();
        for source in &config.sources {
            let (Some(rpm), Some(host)) = (source.rate_limit.requests_per_minute, source.host_key())
            else {
                continue;
            };
            if rpm > 0 {
                overrides.entry(host).or_insert(rpm);
            }
        }

        Self::new(config.crawler.default_requests_per_minute, overrides)
    }

    /// Waits until a request to `domain` is permitted
    ///
    /// # Returns
    ///
    /// * `Ok(())` - A token was taken
    /// * `Err(AggregatorError::Cancelled)` - The token fired before a request was permitted
    pub async fn wait(&self, token: &CancellationToken, domain: &str) -> Result<()> {
        let bucket = self.bucket(domain);

        loop {
            if token.is_cancelled() {
                return Err(AggregatorError::Cancelled("waiting for rate limit"));
            }

            if bucket.take() {
                return Ok(());
            }

            tokio::select! {
                _ = token.cancelled() => {
                    return Err(AggregatorError::Cancelled("waiting for rate limit"));
                }
                _ = sleep(POLL_INTERVAL) => {}
            }
        }
    }

    /// Requests per minute that apply to `domain`
    pub fn requests_per_minute(&self, domain: &str) -> u32 {
        self.overrides
            .get(domain)
            .copied()
            .unwrap_or(self.default_rpm)
    }

    /// Number of domains that have a bucket
    pub fn domain_count(&self) -> usize {
        self.buckets.lock().len()
    }

    fn bucket(&self, domain: &str) -> Arc<TokenBucket> {
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.get(domain) {
            return Arc::clone(bucket);
        }

        let rpm = self.requests_per_minute(domain);
        info!(domain = %domain, rpm, "Created rate limiter");
        let bucket = Arc::new(TokenBucket::per_minute(rpm));
        buckets.insert(domain.to_string(), Arc::clone(&bucket));
        bucket
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_REQUESTS_PER_MINUTE, HashMap::new())
    }
}
