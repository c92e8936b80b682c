//! End-to-end pipeline tests: coordinator, pools and run_aggregation

use crate::test_config;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use web_aggregator::crawler::{run_aggregation, Coordinator, Stage};
use web_aggregator::{AggregatorError, FetchJob, ParserKind, Source};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTICLES: &str = r#"<html><head><title>Blog</title></head><body>
    <div class="post"><h2>First post</h2><a href="/posts/1">read</a></div>
    <div class="post"><h2>Second post</h2><a href="/posts/2">read</a></div>
</body></html>"#;

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

fn blog_source(server: &MockServer) -> Source {
    let mut source = Source::new(
        "blog",
        format!("{}/articles", server.uri()),
        ParserKind::Html,
    );
    source
        .selectors
        .insert("item".to_string(), "div.post".to_string());
    source
        .selectors
        .insert("title".to_string(), "h2".to_string());
    source.selectors.insert("link".to_string(), "a".to_string());
    source
}

#[tokio::test]
async fn test_run_collects_items_and_failures() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/articles"))
        .respond_with(html(ARTICLES))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<rss></rss>"))
        .mount(&server)
        .await;

    let config = test_config(vec![
        blog_source(&server),
        Source::new(
            "missing",
            format!("{}/missing", server.uri()),
            ParserKind::Html,
        ),
        Source::new(
            "feed",
            format!("{}/feed.xml", server.uri()),
            ParserKind::Rss,
        ),
    ]);

    let report = run_aggregation(config, CancellationToken::new())
        .await
        .expect("Aggregation should run");

    let mut titles: Vec<_> = report
        .items
        .iter()
        .filter_map(|item| item.title.clone())
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["First post", "Second post"]);
    assert!(report
        .items
        .iter()
        .all(|item| item.source_name == "blog" && item.extracted_by == "html"));
    assert!(report.items.iter().all(|item| item
        .url
        .as_deref()
        .is_some_and(|u| u.starts_with(&server.uri()) && u.contains("/posts/"))));

    assert_eq!(report.failures.len(), 2);
    let fetch_failure = report
        .failures
        .iter()
        .find(|f| f.stage == Stage::Fetch)
        .expect("missing fetch failure");
    assert_eq!(fetch_failure.source, "missing");
    assert!(matches!(
        fetch_failure.error,
        AggregatorError::HttpStatus { status: 404, .. }
    ));
    let parse_failure = report
        .failures
        .iter()
        .find(|f| f.stage == Stage::Parse)
        .expect("missing parse failure");
    assert_eq!(parse_failure.source, "feed");
    assert_eq!(
        parse_failure.error.to_string(),
        "no parser available for type rss"
    );

    let stats = report.stats;
    assert_eq!(stats.total_sources, 3);
    assert_eq!(stats.processed_sources, 3);
    assert_eq!(stats.successful_fetches, 2);
    assert_eq!(stats.failed_fetches, 1);
    assert_eq!(stats.successful_parses, 1);
    assert_eq!(stats.failed_parses, 1);
    assert!(stats.finished_at.is_some());
}

#[tokio::test]
async fn test_paginated_source_fetches_every_page() {
    let server = MockServer::start().await;

    for page in ["1", "2", "3"] {
        Mock::given(method("GET"))
            .and(path("/list"))
            .and(query_param("page", page))
            .respond_with(html(&format!(
                "<html><head><title>Page {}</title></head><body>entries</body></html>",
                page
            )))
            .expect(1)
            .mount(&server)
            .await;
    }

    let mut source = Source::new(
        "list",
        format!("{}/list?page=${{page}}", server.uri()),
        ParserKind::Html,
    );
    source.pagination.enabled = true;
    source.pagination.start_page = 1;
    source.pagination.max_pages = 3;

    let report = run_aggregation(test_config(vec![source]), CancellationToken::new())
        .await
        .unwrap();

    let mut titles: Vec<_> = report
        .items
        .iter()
        .filter_map(|item| item.title.clone())
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["Page 1", "Page 2", "Page 3"]);
    assert!(report.failures.is_empty());
    assert_eq!(report.stats.total_sources, 3);
    assert_eq!(report.stats.successful_parses, 3);
}

#[tokio::test]
async fn test_coordinator_routes_fetch_results_to_parsers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/articles"))
        .respond_with(html(ARTICLES))
        .mount(&server)
        .await;

    let source = Arc::new(blog_source(&server));
    let coordinator = Coordinator::new(Arc::new(test_config(vec![(*source).clone()]))).unwrap();
    let mut fetch_results = coordinator.take_fetch_results().unwrap();
    let mut parse_results = coordinator.take_parse_results().unwrap();

    let token = CancellationToken::new();
    coordinator.start(&token).unwrap();
    assert!(coordinator.is_running());

    coordinator.submit_fetch_job(source).await.unwrap();

    let fetched = tokio::time::timeout(Duration::from_secs(5), fetch_results.recv())
        .await
        .expect("fetch result timed out")
        .expect("fetch result queue closed");
    assert!(fetched.is_success());
    assert!(fetched.worker_id >= 1);
    assert_eq!(fetched.source.name, "blog");

    let parsed = tokio::time::timeout(Duration::from_secs(5), parse_results.recv())
        .await
        .expect("parse result timed out")
        .expect("parse result queue closed");
    assert!(parsed.is_success());
    assert_eq!(parsed.items.len(), 2);

    coordinator.stop().await;
    assert!(!coordinator.is_running());

    // Every sender is gone once stopped
    assert!(fetch_results.recv().await.is_none());
    assert!(parse_results.recv().await.is_none());

    let stats = coordinator.stats();
    assert_eq!(stats.total_sources, 1);
    assert_eq!(stats.successful_fetches, 1);
    assert_eq!(stats.successful_parses, 1);
}

#[tokio::test]
async fn test_wait_drains_results_nobody_took() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(html("<html><title>t</title></html>"))
        .mount(&server)
        .await;

    let sources: Vec<Source> = (0..6)
        .map(|i| {
            Source::new(
                format!("s{}", i),
                format!("{}/page/{}", server.uri(), i),
                ParserKind::Html,
            )
        })
        .collect();
    let config = test_config(sources.clone());
    let coordinator = Coordinator::new(Arc::new(config)).unwrap();

    coordinator.start(&CancellationToken::new()).unwrap();
    coordinator.wait();

    for source in sources {
        coordinator.submit_fetch_job(Arc::new(source)).await.unwrap();
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while coordinator.stats().successful_parses < 6 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "results were not drained"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    coordinator.stop().await;
    let stats = coordinator.stats();
    assert_eq!(stats.processed_sources, 6);
    assert_eq!(
        stats.processed_sources,
        stats.successful_fetches + stats.failed_fetches
    );
}

#[tokio::test]
async fn test_cancellation_ends_run_promptly() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("<html></html>").set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let sources = (0..3)
        .map(|i| {
            let mut source = Source::new(
                format!("slow{}", i),
                format!("{}/slow", server.uri()),
                ParserKind::Html,
            );
            source.rate_limit.respect_robots_txt = Some(false);
            source
        })
        .collect();
    let mut config = test_config(sources);
    config.crawler.request_timeout = 30;

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            token.cancel();
        });
    }

    let report = tokio::time::timeout(Duration::from_secs(3), run_aggregation(config, token))
        .await
        .expect("run did not stop after cancellation")
        .unwrap();

    assert!(report.items.is_empty());
    assert_eq!(report.stats.successful_fetches, 0);
    assert!(report.stats.finished_at.is_some());
}

#[tokio::test]
async fn test_stop_unblocks_workers_stuck_on_full_queues() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(html("<html><title>t</title></html>"))
        .mount(&server)
        .await;

    let source = Arc::new(Source::new(
        "pages",
        format!("{}/", server.uri()),
        ParserKind::Html,
    ));
    let coordinator = Arc::new(
        Coordinator::new(Arc::new(test_config(vec![(*source).clone()]))).unwrap(),
    );

    // Held but never read, so every result queue fills up
    let _fetch_results = coordinator.take_fetch_results().unwrap();
    let _parse_results = coordinator.take_parse_results().unwrap();

    coordinator.start(&CancellationToken::new()).unwrap();

    let submitter = {
        let coordinator = Arc::clone(&coordinator);
        let source = Arc::clone(&source);
        let base = server.uri();
        tokio::spawn(async move {
            for i in 0..12 {
                let url = Url::parse(&format!("{}/page/{}", base, i)).unwrap();
                let job = FetchJob::new(Arc::clone(&source), url);
                if coordinator.submit_job(job).await.is_err() {
                    break;
                }
            }
        })
    };

    // Four fetch workers can each block on a fetch result queue of capacity four
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while coordinator.stats().processed_sources < 4 {
        assert!(tokio::time::Instant::now() < deadline, "no fetch completed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let before = coordinator.stats();
    assert!(before.processed_sources <= 8);
    assert!(before.processed_sources < before.total_sources);

    tokio::time::timeout(Duration::from_secs(1), coordinator.stop())
        .await
        .expect("stop blocked on a full queue");
    tokio::time::timeout(Duration::from_secs(1), submitter)
        .await
        .expect("submitter stayed blocked")
        .unwrap();

    let stats = coordinator.stats();
    assert!(!coordinator.is_running());
    assert_eq!(
        stats.processed_sources,
        stats.successful_fetches + stats.failed_fetches
    );
    assert!(stats.finished_at.is_some());
}

#[tokio::test]
async fn test_submit_source_pages_queues_one_job_per_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/archive"))
        .respond_with(html("<html><title>archive</title></html>"))
        .expect(4)
        .mount(&server)
        .await;

    let mut source = Source::new(
        "archive",
        format!("{}/archive", server.uri()),
        ParserKind::Html,
    );
    source.pagination.enabled = true;
    source.pagination.start_page = 2;
    source.pagination.max_pages = 4;
    source.pagination.param_name = "p".to_string();
    let source = Arc::new(source);

    let coordinator = Coordinator::new(Arc::new(test_config(vec![(*source).clone()]))).unwrap();
    let mut fetch_results = coordinator.take_fetch_results().unwrap();
    coordinator.start(&CancellationToken::new()).unwrap();
    coordinator.wait();

    let submitted = coordinator.submit_source_pages(source).await.unwrap();
    assert_eq!(submitted, 4);

    let mut pages = Vec::new();
    for _ in 0..submitted {
        let result = tokio::time::timeout(Duration::from_secs(5), fetch_results.recv())
            .await
            .expect("fetch result timed out")
            .expect("fetch result queue closed");
        assert!(result.is_success());
        pages.push(
            result
                .url
                .query_pairs()
                .find(|(key, _)| key == "p")
                .map(|(_, value)| value.into_owned())
                .unwrap(),
        );
    }
    pages.sort();
    assert_eq!(pages, vec!["2", "3", "4", "5"]);

    coordinator.stop().await;
    assert_eq!(coordinator.stats().total_sources, 4);
}
