use crate::url::{host_key, resolve_template, PageParam};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Main configuration structure for the aggregator
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<Source>,
}

impl Config {
    /// Returns the enabled sources, in configuration order
    pub fn enabled_sources(&self) -> Vec<Arc<Source>> {
        self.sources
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .map(Arc::new)
            .collect()
    }

    /// Looks up a source by name
    pub fn source(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }
}

/// Concurrency, timeout and politeness settings
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of fetch workers (also the fetch queue capacity)
    #[serde(rename = "max-fetchers")]
    pub max_fetchers: usize,

    /// Number of parse workers (also the parse queue capacity)
    #[serde(rename = "max-parsers")]
    pub max_parsers: usize,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Maximum redirects followed before a request fails
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Whether sources respect robots.txt unless they say otherwise
    #[serde(rename = "respect-robots-txt", default = "default_true")]
    pub respect_robots_txt: bool,

    /// Requests per minute for domains without a source override
    #[serde(
        rename = "default-requests-per-minute",
        default = "default_requests_per_minute"
    )]
    pub default_requests_per_minute: u32,

    /// How long fetched robots.txt rules stay cached (seconds)
    #[serde(rename = "robots-cache-ttl", default = "default_robots_cache_ttl")]
    pub robots_cache_ttl: u64,
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn robots_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_cache_ttl)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_fetchers: 10,
            max_parsers: 5,
            request_timeout: default_request_timeout(),
            max_redirects: default_max_redirects(),
            respect_robots_txt: true,
            default_requests_per_minute: default_requests_per_minute(),
            robots_cache_ttl: default_robots_cache_ttl(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also the agent token matched against robots.txt
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the full User-Agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Parser selected for a source's payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    Html,
    Json,
    Xml,
    Rss,
}

impl ParserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Rss => "rss",
        }
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content source to fetch from
///
/// Sources are immutable once loaded and shared read-only between workers.
#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    /// Unique name of the source
    pub name: String,

    /// URL template (may contain `${page}` and `${date}`)
    pub url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub parser: ParserKind,

    /// Extra request headers, applied over the default user agent
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Extraction hints for the HTML parser (`item`, `title`, `link`, `content`)
    #[serde(default)]
    pub selectors: HashMap<String, String>,

    #[serde(default, rename = "rate-limit")]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub pagination: PaginationSettings,

    #[serde(default)]
    pub sitemap: SitemapSettings,
}

impl Source {
    /// Creates an enabled source with default settings
    pub fn new(name: impl Into<String>, url: impl Into<String>, parser: ParserKind) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
            parser,
            headers: HashMap::new(),
            selectors: HashMap::new(),
            rate_limit: RateLimitSettings::default(),
            pagination: PaginationSettings::default(),
            sitemap: SitemapSettings::default(),
        }
    }

    /// Resolves the URL of the first page
    pub fn resolved_url(&self) -> Result<Url, url::ParseError> {
        resolve_template(&self.url, self.first_page())
    }

    /// Resolves every page URL this source should fetch
    ///
    /// Non-paginated sources yield exactly one URL.
    pub fn page_urls(&self) -> Result<Vec<Url>, url::ParseError> {
        if !self.pagination.enabled {
            return Ok(vec![self.resolved_url()?]);
        }

        let start = self.pagination.start_page;
        (start..start.saturating_add(self.pagination.max_pages))
            .map(|number| {
                resolve_template(
                    &self.url,
                    Some(PageParam {
                        number,
                        param_name: &self.pagination.param_name,
                    }),
                )
            })
            .collect()
    }

    /// The `host[:port]` this source is fetched from
    pub fn host_key(&self) -> Option<String> {
        self.resolved_url().ok().as_ref().and_then(host_key)
    }

    /// Whether robots.txt is consulted, given the crawler-wide default
    pub fn respects_robots(&self, default: bool) -> bool {
        self.rate_limit.respect_robots_txt.unwrap_or(default)
    }

    fn first_page(&self) -> Option<PageParam<'_>> {
        self.pagination.enabled.then(|| PageParam {
            number: self.pagination.start_page,
            param_name: &self.pagination.param_name,
        })
    }
}

/// Per-source politeness overrides
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimitSettings {
    /// Requests per minute for this source's domain
    #[serde(rename = "requests-per-minute")]
    pub requests_per_minute: Option<u32>,

    /// Overrides the crawler-wide robots.txt setting
    #[serde(rename = "respect-robots-txt")]
    pub respect_robots_txt: Option<bool>,
}

/// Pagination options
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(rename = "start-page", default = "default_start_page")]
    pub start_page: u32,

    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(rename = "param-name", default = "default_page_param")]
    pub param_name: String,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            start_page: default_start_page(),
            max_pages: default_max_pages(),
            param_name: default_page_param(),
        }
    }
}

/// Sitemap options (carried for downstream collaborators)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SitemapSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(rename = "max-urls")]
    pub max_urls: Option<usize>,

    pub pattern: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    10
}

fn default_requests_per_minute() -> u32 {
    30
}

fn default_robots_cache_ttl() -> u64 {
    24 * 60 * 60
}

fn default_start_page() -> u32 {
    1
}

fn default_max_pages() -> u32 {
    1
}

fn default_page_param() -> String {
    "page".to_string()
}
