//! End-to-end crawl sessions against a mock site

use crate::common::{md5_hex, test_body, RangeResponder};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use veil_fetch::config::{Config, FilterConfig, ProxyConfig, RelevanceConfig};
use veil_fetch::crawler::CrawlOrchestrator;
use veil_fetch::storage::{DocumentStore, SessionLog, SessionStatus, SqliteStorage};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn crawl_config(download_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.crawler.max_depth = 2;
    config.crawler.request_delay = 0;
    config.crawler.max_retries = 1;
    config.crawler.retry_delay = 10;
    config.crawler.request_timeout = 5_000;
    config.crawler.ip_check_services.clear();
    config.filter = FilterConfig {
        allowed_schemes: vec!["http".to_string()],
        allowed_paths: Vec::new(),
        allowed_params: vec!["md5".to_string(), "id".to_string()],
        allowed_hosts: vec!["127.0.0.1".to_string()],
    };
    config.download.directory = download_dir.display().to_string();
    config.download.require_https_redirects = false;
    config.download.redirect_host_suffixes.clear();
    config.proxy = ProxyConfig {
        socks_address: None,
        control_address: None,
        ..ProxyConfig::default()
    };
    config.relevance = Some(RelevanceConfig::Keyword {
        keywords: "economy".to_string(),
    });
    config
}

async fn page(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_stores_relevant_pages_and_downloads_attachments() {
    let server = MockServer::start().await;
    let workdir = tempfile::tempdir().unwrap();
    let download_dir = workdir.path().join("downloads");
    let body = test_body(2_500);
    let checksum = md5_hex(&body);

    page(
        &server,
        "/",
        format!(
            r#"<html><head><title>Economy index</title></head><body>
            <p>Weekly economy reports.</p>
            <a href="/page1">Page 1</a>
            <a href="/page2">Page 2</a>
            <a href="/download?md5={checksum}">Report</a>
            <a href="https://elsewhere.test/x">Elsewhere</a>
            <a href="/irrelevant">Recipes</a>
            </body></html>"#
        ),
    )
    .await;
    page(
        &server,
        "/page1",
        r#"<html><head><title>Economy outlook</title></head>
        <body><p>The economy is expected to slow.</p></body></html>"#
            .to_string(),
    )
    .await;
    page(
        &server,
        "/irrelevant",
        r#"<html><head><title>Cooking</title></head>
        <body><p>How to bake bread at home.</p></body></html>"#
            .to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/download"))
        .respond_with(
            RangeResponder::new(body.clone())
                .header("content-disposition", r#"attachment; filename="report.pdf""#),
        )
        .mount(&server)
        .await;

    let storage = Arc::new(SqliteStorage::new(&workdir.path().join("crawl.db")).unwrap());
    let orchestrator =
        CrawlOrchestrator::new(crawl_config(&download_dir), Some(Arc::clone(&storage)))
            .await
            .unwrap()
            .with_config_hash("test-hash");

    let stats = orchestrator
        .run(&[format!("{}/", server.uri())], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.pages_fetched, 4);
    assert_eq!(stats.pages_failed, 1);
    assert_eq!(stats.pages_irrelevant, 1);
    assert_eq!(stats.documents_stored, 2);
    assert_eq!(stats.downloads_promoted, 1);
    assert_eq!(stats.downloads_failed, 0);
    assert!(stats.urls_rejected >= 1);
    assert_eq!(stats.rotations, 0);

    assert_eq!(storage.document_count().unwrap(), 2);
    assert_eq!(
        std::fs::read(download_dir.join("report.pdf")).unwrap(),
        body
    );

    let session = storage.get_session(orchestrator.session_id()).unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.config_hash, "test-hash");
    assert!(session.finished_at.is_some());
}

#[tokio::test]
async fn test_irrelevant_pages_are_not_followed() {
    let server = MockServer::start().await;
    let workdir = tempfile::tempdir().unwrap();

    page(
        &server,
        "/",
        r#"<html><head><title>Gardening</title></head><body>
        <p>Tomatoes need sun.</p><a href="/economy">More</a>
        </body></html>"#
            .to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/economy"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let orchestrator = CrawlOrchestrator::new(crawl_config(workdir.path()), None)
        .await
        .unwrap();
    let stats = orchestrator
        .run(&[format!("{}/", server.uri())], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.pages_fetched, 1);
    assert_eq!(stats.pages_irrelevant, 1);
    assert_eq!(stats.documents_stored, 0);
}

#[tokio::test]
async fn test_cancelled_session_is_recorded() {
    let server = MockServer::start().await;
    let workdir = tempfile::tempdir().unwrap();
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());

    let orchestrator =
        CrawlOrchestrator::new(crawl_config(workdir.path()), Some(Arc::clone(&storage)))
            .await
            .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let stats = orchestrator
        .run(&[format!("{}/", server.uri())], cancel)
        .await
        .unwrap();

    assert_eq!(stats.pages_fetched, 0);
    assert!(server.received_requests().await.unwrap().is_empty());

    let session = storage.get_session(orchestrator.session_id()).unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
}
