//! HTTP fetcher implementation
//!
//! This module performs one retrieval per call:
//! - Consults the robots.txt cache when the source respects it
//! - Waits for the domain's rate budget
//! - Issues the request with the source's headers over the default user agent
//! - Classifies failures into transport, status and policy errors

use crate::config::{Config, Source};
use crate::crawler::limiter::RateLimiter;
use crate::model::Content;
use crate::robots::{RobotsCache, RobotsCacheOptions};
use crate::url::host_key;
use crate::{AggregatorError, Result};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The aggregator configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &Config) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.header_value())
        .timeout(config.crawler.request_timeout())
        .connect_timeout(Duration::from_secs(10).min(config.crawler.request_timeout()))
        .redirect(Policy::limited(config.crawler.max_redirects))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Performs polite HTTP retrievals for configured sources
pub struct Fetcher {
    config: Arc<Config>,
    client: Client,
    limiter: RateLimiter,
    robots: Arc<RobotsCache>,
}

impl Fetcher {
    /// Creates a fetcher with its own rate limiter and robots.txt cache
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = build_http_client(&config)?;
        let robots = RobotsCache::with_client(
            client.clone(),
            RobotsCacheOptions {
                user_agent: config.user_agent.header_value(),
                ttl: config.crawler.robots_cache_ttl(),
                timeout: config.crawler.request_timeout(),
            },
        );

        Ok(Self::with_robots(config, client, Arc::new(robots)))
    }

    /// Creates a fetcher that shares an existing robots.txt cache
    pub fn with_robots(config: Arc<Config>, client: Client, robots: Arc<RobotsCache>) -> Self {
        let limiter = RateLimiter::from_config(&config);
        Self {
            config,
            client,
            limiter,
            robots,
        }
    }

    pub fn robots(&self) -> &Arc<RobotsCache> {
        &self.robots
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Fetches the first page of a source
    pub async fn fetch(&self, token: &CancellationToken, source: &Arc<Source>) -> Result<Content> {
        let url = source.resolved_url()?;
        self.fetch_url(token, source, &url).await
    }

    /// Fetches one URL on behalf of a source
    ///
    /// # Request Flow
    ///
    /// 1. robots.txt check (deny fails the fetch; a lookup error is only logged)
    /// 2. Rate limiter wait for the URL's `host[:port]`
    /// 3. GET with the source's headers, following up to `max-redirects` hops
    /// 4. Non-2xx status fails the fetch
    ///
    /// # Returns
    ///
    /// * `Ok(Content)` - The response body and metadata
    /// * `Err(AggregatorError)` - Policy, transport, status or cancellation failure
    pub async fn fetch_url(
        &self,
        token: &CancellationToken,
        source: &Arc<Source>,
        url: &Url,
    ) -> Result<Content> {
        let domain = host_key(url)
            .ok_or_else(|| AggregatorError::InvalidUrl(format!("{} has no host", url)))?;

        if source.respects_robots(self.config.crawler.respect_robots_txt) {
            self.check_robots(token, url).await?;
        }

        self.limiter.wait(token, &domain).await?;

        debug!(source = %source.name, url = %url, "Fetching");
        let request = self
            .client
            .get(url.clone())
            .headers(source_headers(source));

        let response = tokio::select! {
            _ = token.cancelled() => return Err(AggregatorError::Cancelled("fetching")),
            response = request.send() => response.map_err(|e| classify_error(url, e))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(AggregatorError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let headers = response.headers().clone();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = tokio::select! {
            _ = token.cancelled() => return Err(AggregatorError::Cancelled("reading response body")),
            body = response.bytes() => body.map_err(|e| classify_error(url, e))?,
        };

        debug!(
            source = %source.name,
            url = %final_url,
            status = status.as_u16(),
            bytes = body.len(),
            "Fetched"
        );

        Ok(Content {
            source: Arc::clone(source),
            url: final_url,
            body: body.to_vec(),
            content_type,
            status: status.as_u16(),
            headers,
            fetched_at: Utc::now(),
        })
    }

    async fn check_robots(&self, token: &CancellationToken, url: &Url) -> Result<()> {
        let agent = &self.config.user_agent.crawler_name;
        let allowed = tokio::select! {
            _ = token.cancelled() => return Err(AggregatorError::Cancelled("checking robots.txt")),
            allowed = self.robots.is_allowed(url, agent) => allowed,
        };

        match allowed {
            Ok(true) => Ok(()),
            Ok(false) => Err(AggregatorError::RobotsDenied {
                url: url.to_string(),
            }),
            Err(e) => {
                warn!(url = %url, error = %e, "robots.txt check failed, continuing");
                Ok(())
            }
        }
    }
}

/// Converts a source's configured headers, skipping ones that are not valid HTTP
fn source_headers(source: &Source) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &source.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(source = %source.name, header = %name, "Skipping invalid header"),
        }
    }
    headers
}

fn classify_error(url: &Url, error: reqwest::Error) -> AggregatorError {
    if error.is_timeout() {
        AggregatorError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_redirect() {
        AggregatorError::RedirectLimit {
            url: url.to_string(),
        }
    } else {
        AggregatorError::Http {
            url: url.to_string(),
            source: error,
        }
    }
}
