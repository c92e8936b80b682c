use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use web_aggregator::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the `host[:port]` key used to group requests per site
///
/// Rate budgets and cached robots.txt rules are both keyed by this value, so
/// two servers on the same host but different ports are treated as distinct
/// sites. Default ports are omitted.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use web_aggregator::url::host_key;
///
/// let url = Url::parse("http://127.0.0.1:8080/feed").unwrap();
/// assert_eq!(host_key(&url), Some("127.0.0.1:8080".to_string()));
///
/// let url = Url::parse("https://News.Example.com:443/").unwrap();
/// assert_eq!(host_key(&url), Some("news.example.com".to_string()));
/// ```
pub fn host_key(url: &Url) -> Option<String> {
    let domain = extract_domain(url)?;
    match url.port() {
        Some(port) => Some(format!("{}:{}", domain, port)),
        None => Some(domain),
    }
}
