//! Fetcher tests against a mock server

use crate::{test_config, TEST_USER_AGENT};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use web_aggregator::crawler::Fetcher;
use web_aggregator::{AggregatorError, ParserKind, Source};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher_for(source: &Source) -> Fetcher {
    let config = test_config(vec![source.clone()]);
    Fetcher::new(Arc::new(config)).expect("Failed to build fetcher")
}

#[tokio::test]
async fn test_fetch_returns_body_and_sends_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/news"))
        .and(header("user-agent", TEST_USER_AGENT))
        .and(header("x-api-key", "secret"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><title>News</title></html>")
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut source = Source::new("news", format!("{}/news", server.uri()), ParserKind::Html);
    source
        .headers
        .insert("X-Api-Key".to_string(), "secret".to_string());
    let source = Arc::new(source);

    let fetcher = fetcher_for(&source);
    let content = fetcher
        .fetch(&CancellationToken::new(), &source)
        .await
        .expect("Fetch should succeed");

    assert_eq!(content.status, 200);
    assert_eq!(content.url, format!("{}/news", server.uri()));
    assert!(content.has_content_type("text/html"));
    assert_eq!(content.text(), "<html><title>News</title></html>");
    assert_eq!(content.source.name, "news");
}

#[tokio::test]
async fn test_robots_denial_skips_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private/feed"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let source = Arc::new(Source::new(
        "private",
        format!("{}/private/feed", server.uri()),
        ParserKind::Html,
    ));

    let err = fetcher_for(&source)
        .fetch(&CancellationToken::new(), &source)
        .await
        .unwrap_err();
    assert!(matches!(err, AggregatorError::RobotsDenied { .. }));
}

#[tokio::test]
async fn test_source_can_opt_out_of_robots() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /*\n"))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let mut source = Source::new("feed", format!("{}/feed", server.uri()), ParserKind::Html);
    source.rate_limit.respect_robots_txt = Some(false);
    let source = Arc::new(source);

    let content = fetcher_for(&source)
        .fetch(&CancellationToken::new(), &source)
        .await
        .expect("Fetch should succeed");
    assert_eq!(content.body, b"ok");
}

#[tokio::test]
async fn test_error_status_fails_fetch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let source = Arc::new(Source::new(
        "down",
        format!("{}/down", server.uri()),
        ParserKind::Html,
    ));

    let err = fetcher_for(&source)
        .fetch(&CancellationToken::new(), &source)
        .await
        .unwrap_err();
    match err {
        AggregatorError::HttpStatus { status, .. } => assert_eq!(status, 503),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_redirects_are_followed_up_to_the_limit() {
    let server = MockServer::start().await;

    // /hop/0 -> /hop/1 -> ... -> /hop/5 -> /end
    for i in 0..6 {
        let next = if i == 5 {
            format!("{}/end", server.uri())
        } else {
            format!("{}/hop/{}", server.uri(), i + 1)
        };
        Mock::given(method("GET"))
            .and(path(format!("/hop/{}", i)))
            .respond_with(ResponseTemplate::new(302).insert_header("location", next.as_str()))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/end"))
        .respond_with(ResponseTemplate::new(200).set_body_string("done"))
        .mount(&server)
        .await;

    // Two hops fit within max-redirects = 3
    let near = Arc::new(Source::new(
        "near",
        format!("{}/hop/4", server.uri()),
        ParserKind::Html,
    ));
    let content = fetcher_for(&near)
        .fetch(&CancellationToken::new(), &near)
        .await
        .expect("Fetch should follow redirects");
    assert_eq!(content.url, format!("{}/end", server.uri()));

    // Six hops exceed it
    let far = Arc::new(Source::new(
        "far",
        format!("{}/hop/0", server.uri()),
        ParserKind::Html,
    ));
    let err = fetcher_for(&far)
        .fetch(&CancellationToken::new(), &far)
        .await
        .unwrap_err();
    assert!(matches!(err, AggregatorError::RedirectLimit { .. }));
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let source = Source::new("slow", format!("{}/slow", server.uri()), ParserKind::Html);
    let mut config = test_config(vec![source.clone()]);
    config.crawler.request_timeout = 1;
    let fetcher = Fetcher::new(Arc::new(config)).unwrap();

    let err = fetcher
        .fetch(&CancellationToken::new(), &Arc::new(source))
        .await
        .unwrap_err();
    assert!(matches!(err, AggregatorError::Timeout { .. }));
}

#[tokio::test]
async fn test_cancelled_token_aborts_fetch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let mut source = Source::new("page", format!("{}/page", server.uri()), ParserKind::Html);
    source.rate_limit.respect_robots_txt = Some(false);
    let source = Arc::new(source);
    let fetcher = fetcher_for(&source);

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        })
    };

    let started = std::time::Instant::now();
    let err = fetcher.fetch(&token, &source).await.unwrap_err();
    canceller.await.unwrap();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_fetch_url_keys_rate_limit_by_host() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let source = Arc::new(Source::new(
        "pages",
        format!("{}/", server.uri()),
        ParserKind::Html,
    ));
    let fetcher = fetcher_for(&source);
    let token = CancellationToken::new();

    for page in ["/a", "/b", "/c"] {
        let url = Url::parse(&format!("{}{}", server.uri(), page)).unwrap();
        fetcher.fetch_url(&token, &source, &url).await.unwrap();
    }

    assert_eq!(fetcher.limiter().domain_count(), 1);
    assert_eq!(fetcher.robots().len(), 1);
}
