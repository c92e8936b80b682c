//! Robots.txt caching implementation
//!
//! Rule sets are cached per `host[:port]` and expire after a configurable TTL.
//! Expired entries are refreshed lazily on the next lookup.

use crate::robots::RobotsRuleSet;
use crate::url::host_key;
use crate::{AggregatorError, Result};
use parking_lot::RwLock;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_USER_AGENT: &str = "WebAggregator/1.0";
const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cached robots.txt data for a host
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed rule set
    pub rules: Arc<RobotsRuleSet>,

    /// When the entry must be refreshed
    pub expires_at: Instant,
}

impl CachedRobots {
    pub fn new(rules: RobotsRuleSet, ttl: Duration) -> Self {
        Self {
            rules: Arc::new(rules),
            expires_at: Instant::now() + ttl,
        }
    }

    /// Checks if the entry has passed its expiration
    pub fn is_stale(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Options for building a [`RobotsCache`]
#[derive(Debug, Clone)]
pub struct RobotsCacheOptions {
    /// User-Agent header sent with robots.txt requests
    pub user_agent: String,

    /// How long a fetched rule set stays valid
    pub ttl: Duration,

    /// Timeout for a single robots.txt request
    pub timeout: Duration,
}

impl Default for RobotsCacheOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            ttl: DEFAULT_TTL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Per-host cache of parsed robots.txt rule sets
///
/// Lookups take a read lock; a miss or an expired entry is fetched without
/// holding any lock and then swapped in under the write lock. Concurrent
/// misses for the same host may fetch twice; the last writer wins.
pub struct RobotsCache {
    entries: RwLock<HashMap<String, CachedRobots>>,
    client: reqwest::Client,
    user_agent: String,
    ttl: Duration,
}

impl RobotsCache {
    /// Creates a cache with its own HTTP client
    pub fn new(options: RobotsCacheOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()?;
        Ok(Self::with_client(client, options))
    }

    /// Creates a cache that fetches through an existing client
    pub fn with_client(client: reqwest::Client, options: RobotsCacheOptions) -> Self {
        let user_agent = if options.user_agent.is_empty() {
            DEFAULT_USER_AGENT.to_string()
        } else {
            options.user_agent
        };

        Self {
            entries: RwLock::new(HashMap::new()),
            client,
            user_agent,
            ttl: options.ttl,
        }
    }

    /// Checks if a URL may be fetched by `agent`
    ///
    /// Fails open: when robots.txt cannot be retrieved the failure is logged
    /// and the URL is allowed.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to check; its path and query are matched against the rules
    /// * `agent` - The robots agent token (the bare crawler name)
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The URL is allowed (or robots.txt was unavailable)
    /// * `Ok(false)` - A rule denies the URL
    /// * `Err(AggregatorError)` - The URL has no host
    pub async fn is_allowed(&self, url: &Url, agent: &str) -> Result<bool> {
        let host = Self::key(url)?;

        let rules = match self.rules(url).await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(host = %host, error = %e, "Couldn't fetch robots.txt, allowing");
                return Ok(true);
            }
        };

        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        Ok(rules.is_allowed(&path, agent))
    }

    /// Returns the sitemap URLs listed in the host's robots.txt
    pub async fn get_sitemaps(&self, url: &Url) -> Result<Vec<String>> {
        let rules = self.rules(url).await?;
        Ok(rules.sitemaps().to_vec())
    }

    /// Returns the crawl delay the host asks of `agent`, if any
    pub async fn get_crawl_delay(&self, url: &Url, agent: &str) -> Result<Option<Duration>> {
        let rules = self.rules(url).await?;
        Ok(rules.crawl_delay(agent))
    }

    /// Removes every cached entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Removes one host's entry (`host[:port]`)
    pub fn remove_host(&self, host: &str) {
        self.entries.write().remove(&host.to_ascii_lowercase());
    }

    /// Number of cached hosts, stale entries included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns the host's rule set, fetching it on a miss or after expiry
    pub async fn rules(&self, url: &Url) -> Result<Arc<RobotsRuleSet>> {
        let host = Self::key(url)?;

        let cached = self
            .entries
            .read()
            .get(&host)
            .filter(|entry| !entry.is_stale())
            .map(|entry| Arc::clone(&entry.rules));
        if let Some(rules) = cached {
            return Ok(rules);
        }

        let rules = self.fetch(url).await?;
        let entry = CachedRobots::new(rules, self.ttl);
        let rules = Arc::clone(&entry.rules);
        self.entries.write().insert(host, entry);

        Ok(rules)
    }

    async fn fetch(&self, url: &Url) -> Result<RobotsRuleSet> {
        let robots_url = url.join("/robots.txt")?;
        debug!(url = %robots_url, "Fetching robots.txt");

        let response = self
            .client
            .get(robots_url.clone())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| AggregatorError::Http {
                url: robots_url.to_string(),
                source: e,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(url = %robots_url, "No robots.txt, allowing everything");
                Ok(RobotsRuleSet::allow_all())
            }
            status if status.is_success() => {
                let body = response.text().await.map_err(|e| AggregatorError::Http {
                    url: robots_url.to_string(),
                    source: e,
                })?;
                Ok(RobotsRuleSet::parse(&body))
            }
            status => Err(AggregatorError::Robots(format!(
                "received status {} from {}",
                status.as_u16(),
                robots_url
            ))),
        }
    }

    fn key(url: &Url) -> Result<String> {
        host_key(url).ok_or_else(|| AggregatorError::InvalidUrl(format!("{} has no host", url)))
    }

    #[cfg(test)]
    fn insert(&self, host: &str, entry: CachedRobots) {
        self.entries.write().insert(host.to_string(), entry);
    }
}
