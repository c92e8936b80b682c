//! Web Aggregator: a polite concurrent content aggregator
//!
//! This crate fetches content from many configured sources through a bounded
//! fetch worker pool, respecting robots.txt and per-domain rate budgets, and
//! hands every successful fetch to a bounded parse worker pool.

pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod robots;
pub mod url;

use thiserror::Error;

/// Main error type for aggregator operations
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Too many redirects from {url}")]
    RedirectLimit { url: String },

    #[error("HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("URL disallowed by robots.txt: {url}")]
    RobotsDenied { url: String },

    #[error("Robots.txt error: {0}")]
    Robots(String),

    #[error("Cancelled while {0}")]
    Cancelled(&'static str),

    #[error("{0} queue is closed")]
    QueueClosed(&'static str),

    #[error("no parser available for type {kind}")]
    NoParser { kind: String },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AggregatorError {
    /// Returns true if this error came from a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors reported by a content parser
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{0} parsing is not implemented")]
    Unsupported(String),

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Malformed content: {0}")]
    Malformed(String),

    #[error("Parser task failed: {0}")]
    Task(String),
}

/// Result type alias for aggregator operations
pub type Result<T> = std::result::Result<T, AggregatorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, ParserKind, Source};
pub use crawler::{run_aggregation, Coordinator, RunReport, WorkerPool};
pub use model::{Content, FetchJob, FetchResult, Item, ParseJob, ParseResult, Stats};
pub use robots::RobotsCache;
