//! robots.txt cache tests against a mock server

use crate::{TEST_AGENT, TEST_USER_AGENT};
use std::time::Duration;
use url::Url;
use web_aggregator::robots::{RobotsCache, RobotsCacheOptions};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cache_with_ttl(ttl: Duration) -> RobotsCache {
    RobotsCache::new(RobotsCacheOptions {
        user_agent: TEST_USER_AGENT.to_string(),
        ttl,
        timeout: Duration::from_secs(5),
    })
    .expect("Failed to build robots cache")
}

fn url(server: &MockServer, path: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), path)).expect("Failed to parse URL")
}

#[tokio::test]
async fn test_disallow_rules_are_fetched_once_and_cached() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .and(header("user-agent", TEST_USER_AGENT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nDisallow: /private\nAllow: /private/press\n"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_with_ttl(Duration::from_secs(3600));

    assert!(!cache
        .is_allowed(&url(&server, "/private/docs"), TEST_AGENT)
        .await
        .unwrap());
    assert!(!cache
        .is_allowed(&url(&server, "/private"), TEST_AGENT)
        .await
        .unwrap());
    assert!(cache
        .is_allowed(&url(&server, "/private/press/release"), TEST_AGENT)
        .await
        .unwrap());
    assert!(cache
        .is_allowed(&url(&server, "/public"), TEST_AGENT)
        .await
        .unwrap());
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_missing_robots_allows_everything() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_with_ttl(Duration::from_secs(3600));

    assert!(cache
        .is_allowed(&url(&server, "/anything"), TEST_AGENT)
        .await
        .unwrap());
    assert!(cache
        .is_allowed(&url(&server, "/admin"), TEST_AGENT)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_server_error_fails_open() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let cache = cache_with_ttl(Duration::from_secs(3600));
    let target = url(&server, "/page");

    assert!(cache.is_allowed(&target, TEST_AGENT).await.unwrap());
    // Failed fetches are not cached
    assert!(cache.is_empty());
    assert!(cache.rules(&target).await.is_err());
}

#[tokio::test]
async fn test_agent_section_overrides_wildcard() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "User-agent: testbot\nDisallow: /drafts\n\nUser-agent: *\nDisallow: /*\n",
        ))
        .mount(&server)
        .await;

    let cache = cache_with_ttl(Duration::from_secs(3600));

    assert!(cache
        .is_allowed(&url(&server, "/news"), TEST_AGENT)
        .await
        .unwrap());
    assert!(!cache
        .is_allowed(&url(&server, "/drafts/1"), TEST_AGENT)
        .await
        .unwrap());
    assert!(!cache
        .is_allowed(&url(&server, "/news"), "OtherBot")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_sitemaps_and_crawl_delay() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "Sitemap: https://example.com/sitemap.xml\n\nUser-agent: *\nCrawl-delay: 2\n",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_with_ttl(Duration::from_secs(3600));
    let target = url(&server, "/");

    assert_eq!(
        cache.get_sitemaps(&target).await.unwrap(),
        vec!["https://example.com/sitemap.xml".to_string()]
    );
    assert_eq!(
        cache.get_crawl_delay(&target, TEST_AGENT).await.unwrap(),
        Some(Duration::from_secs(2))
    );
}

#[tokio::test]
async fn test_expired_entries_are_refetched() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /x\n"))
        .expect(2)
        .mount(&server)
        .await;

    // A zero TTL makes every entry stale as soon as it is stored
    let cache = cache_with_ttl(Duration::ZERO);

    assert!(!cache.is_allowed(&url(&server, "/x"), TEST_AGENT).await.unwrap());
    assert!(!cache.is_allowed(&url(&server, "/x"), TEST_AGENT).await.unwrap());
}

#[tokio::test]
async fn test_remove_host_forces_refetch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let cache = cache_with_ttl(Duration::from_secs(3600));
    let target = url(&server, "/");
    let host = target.host_str().unwrap().to_string();
    let key = format!("{}:{}", host, target.port().unwrap());

    cache.is_allowed(&target, TEST_AGENT).await.unwrap();
    cache.remove_host(&key);
    assert!(cache.is_empty());

    cache.is_allowed(&target, TEST_AGENT).await.unwrap();
    assert_eq!(cache.len(), 1);

    cache.clear();
    assert!(cache.is_empty());
}
