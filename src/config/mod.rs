//! Configuration module for the aggregator
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Configuration errors are fatal: they surface before any worker starts.
//!
//! # Example
//!
//! ```no_run
//! use web_aggregator::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("aggregator.toml")).unwrap();
//! println!("Fetch workers: {}", config.crawler.max_fetchers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, PaginationSettings, ParserKind, RateLimitSettings, SitemapSettings,
    Source, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
