use crate::config::types::{Config, CrawlerConfig, Source, UserAgentConfig};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_sources(&config.sources)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_fetchers < 1 || config.max_fetchers > 100 {
        return Err(ConfigError::Validation(format!(
            "max_fetchers must be between 1 and 100, got {}",
            config.max_fetchers
        )));
    }

    if config.max_parsers < 1 || config.max_parsers > 100 {
        return Err(ConfigError::Validation(format!(
            "max_parsers must be between 1 and 100, got {}",
            config.max_parsers
        )));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(
            "request_timeout must be at least 1 second".to_string(),
        ));
    }

    if config.max_redirects > 50 {
        return Err(ConfigError::Validation(format!(
            "max_redirects must be <= 50, got {}",
            config.max_redirects
        )));
    }

    if config.default_requests_per_minute < 1 {
        return Err(ConfigError::Validation(
            "default_requests_per_minute must be >= 1".to_string(),
        ));
    }

    if config.robots_cache_ttl < 1 {
        return Err(ConfigError::Validation(
            "robots_cache_ttl must be at least 1 second".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates source entries
fn validate_sources(sources: &[Source]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();

    for source in sources {
        if source.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "source name cannot be empty".to_string(),
            ));
        }

        if !names.insert(source.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source name: '{}'",
                source.name
            )));
        }

        validate_source(source)?;
    }

    Ok(())
}

fn validate_source(source: &Source) -> Result<(), ConfigError> {
    if source.url.is_empty() {
        return Err(ConfigError::Validation(format!(
            "source '{}' must have a URL",
            source.name
        )));
    }

    let url = source.resolved_url().map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid URL '{}' for source '{}': {}",
            source.url, source.name, e
        ))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "source '{}' must use an HTTP(S) URL, got scheme '{}'",
            source.name,
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "URL '{}' for source '{}' has no host",
            source.url, source.name
        )));
    }

    if source.rate_limit.requests_per_minute == Some(0) {
        return Err(ConfigError::Validation(format!(
            "requests_per_minute for source '{}' must be >= 1",
            source.name
        )));
    }

    if source.pagination.enabled {
        if source.pagination.max_pages < 1 {
            return Err(ConfigError::Validation(format!(
                "max_pages for source '{}' must be >= 1",
                source.name
            )));
        }

        if source.pagination.param_name.is_empty() {
            return Err(ConfigError::Validation(format!(
                "param_name for source '{}' cannot be empty",
                source.name
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let (local, domain) = email.split_once('@').ok_or_else(|| {
        ConfigError::Validation(format!("Invalid email format: '{}'", email))
    })?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
