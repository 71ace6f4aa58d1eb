//! Resumable download protocol against a mock file server

use crate::common::{
    direct_identity, download_config, md5_hex, received_ranges, test_body, RangeResponder,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use veil_fetch::download::{
    ChecksumError, DownloadError, DownloadManager, DownloadRequest, RedirectViolation,
};
use veil_fetch::storage::{ArtifactLedger, SqliteStorage};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    server: MockServer,
    dir: tempfile::TempDir,
    manager: DownloadManager,
}

async fn fixture() -> Fixture {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = download_config(dir.path());
    let manager = DownloadManager::new(direct_identity(&config), config);
    Fixture {
        server,
        dir,
        manager,
    }
}

async fn serve(server: &MockServer, route: &str, responder: RangeResponder) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(responder)
        .mount(server)
        .await;
}

fn request(server: &MockServer, route: &str, checksum: &str) -> DownloadRequest {
    let url = Url::parse(&format!("{}{}?md5={}", server.uri(), route, checksum)).unwrap();
    DownloadRequest::new(url)
}

#[tokio::test]
async fn test_full_download_with_known_size() {
    let fx = fixture().await;
    let body = test_body(10_000);
    let checksum = md5_hex(&body);

    Mock::given(method("HEAD"))
        .and(path("/get.php"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("content-length", body.len().to_string().as_str()),
        )
        .mount(&fx.server)
        .await;
    serve(&fx.server, "/get.php", RangeResponder::new(body.clone())).await;

    let outcome = fx
        .manager
        .download(request(&fx.server, "/get.php", &checksum), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.bytes, body.len() as u64);
    assert_eq!(outcome.resumed_from, 0);
    assert!(!outcome.already_present);
    assert_eq!(outcome.checksum.as_deref(), Some(checksum.as_str()));
    assert_eq!(outcome.path, fx.dir.path().join(&checksum));
    assert_eq!(std::fs::read(&outcome.path).unwrap(), body);

    let leftovers: Vec<_> = std::fs::read_dir(fx.dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".download.tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_streaming_download_ends_on_short_read() {
    let fx = fixture().await;
    let body = test_body(2_500);
    let checksum = md5_hex(&body);
    serve(&fx.server, "/get.php", RangeResponder::new(body.clone())).await;

    let outcome = fx
        .manager
        .download(request(&fx.server, "/get.php", &checksum), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(std::fs::read(&outcome.path).unwrap(), body);
    assert_eq!(
        received_ranges(&fx.server).await,
        vec!["bytes=0-1023", "bytes=1024-2047", "bytes=2048-3071"]
    );
}

#[tokio::test]
async fn test_streaming_download_ends_on_416() {
    let fx = fixture().await;
    let body = test_body(2_048);
    let checksum = md5_hex(&body);
    serve(&fx.server, "/get.php", RangeResponder::new(body.clone())).await;

    let outcome = fx
        .manager
        .download(request(&fx.server, "/get.php", &checksum), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.bytes, 2_048);
    assert_eq!(std::fs::read(&outcome.path).unwrap(), body);
}

#[tokio::test]
async fn test_resume_from_partial_temp_file() {
    let fx = fixture().await;
    let body = test_body(5_000);
    let checksum = md5_hex(&body);
    serve(&fx.server, "/get.php", RangeResponder::new(body.clone())).await;

    let req = request(&fx.server, "/get.php", &checksum);
    let job = fx.manager.prepare_job(&req);
    std::fs::write(&job.temp_path, &body[..3_000]).unwrap();

    let outcome = fx
        .manager
        .download(req, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.resumed_from, 3_000);
    assert_eq!(std::fs::read(&outcome.path).unwrap(), body);
    assert!(!job.temp_path.exists());

    let ranges = received_ranges(&fx.server).await;
    assert_eq!(ranges.first().map(String::as_str), Some("bytes=3000-4023"));
}

#[tokio::test]
async fn test_ignored_range_on_resume_fails() {
    let fx = fixture().await;
    let body = test_body(5_000);
    let checksum = md5_hex(&body);
    let mut responder = RangeResponder::new(body.clone());
    responder.ignore_range = true;
    serve(&fx.server, "/get.php", responder).await;

    let req = request(&fx.server, "/get.php", &checksum);
    let job = fx.manager.prepare_job(&req);
    std::fs::write(&job.temp_path, &body[..3_000]).unwrap();

    let err = fx
        .manager
        .download(req, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::RangeIgnored(3_000)), "{err:?}");
    assert!(!job.temp_path.exists());
    assert!(!job.final_path.exists());
}

#[tokio::test]
async fn test_ignored_range_at_zero_takes_whole_body() {
    let fx = fixture().await;
    let body = test_body(3_000);
    let checksum = md5_hex(&body);
    let mut responder = RangeResponder::new(body.clone());
    responder.ignore_range = true;
    serve(&fx.server, "/get.php", responder).await;

    let outcome = fx
        .manager
        .download(request(&fx.server, "/get.php", &checksum), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(std::fs::read(&outcome.path).unwrap(), body);
}

#[tokio::test]
async fn test_content_range_mismatch_fails() {
    let fx = fixture().await;
    let body = test_body(3_000);
    let checksum = md5_hex(&body);
    let mut responder = RangeResponder::new(body);
    responder.skew = 1;
    serve(&fx.server, "/get.php", responder).await;

    let req = request(&fx.server, "/get.php", &checksum);
    let job = fx.manager.prepare_job(&req);
    let err = fx
        .manager
        .download(req, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(
        matches!(err, DownloadError::ContentRangeMismatch { expected: 0, .. }),
        "{err:?}"
    );
    assert!(!job.final_path.exists());
}

#[tokio::test]
async fn test_checksum_mismatch_discards_artifact() {
    let fx = fixture().await;
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let config = download_config(fx.dir.path());
    let manager = DownloadManager::new(direct_identity(&config), config)
        .with_ledger(Arc::clone(&storage) as Arc<dyn ArtifactLedger>);

    let body = test_body(3_000);
    let wrong = md5_hex(b"something else");
    serve(&fx.server, "/get.php", RangeResponder::new(body)).await;

    let req = request(&fx.server, "/get.php", &wrong);
    let source_url = req.url.to_string();
    let job = manager.prepare_job(&req);
    let err = manager
        .download(req, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(
        matches!(err, DownloadError::Checksum(ChecksumError::Mismatch { .. })),
        "{err:?}"
    );
    assert!(!job.temp_path.exists());
    assert!(!job.final_path.exists());

    let record = storage.find_artifact(&source_url).unwrap().unwrap();
    assert_eq!(record.state, "discarded");
}

#[tokio::test]
async fn test_unrecognized_checksum_is_discarded_without_fetching() {
    let fx = fixture().await;
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let config = download_config(fx.dir.path());
    let manager = DownloadManager::new(direct_identity(&config), config)
        .with_ledger(Arc::clone(&storage) as Arc<dyn ArtifactLedger>);
    serve(&fx.server, "/get.php", RangeResponder::new(test_body(3_000))).await;

    let req = request(&fx.server, "/get.php", "abc");
    let source_url = req.url.to_string();
    let job = manager.prepare_job(&req);
    std::fs::write(&job.temp_path, test_body(3_000)).unwrap();

    for _ in 0..2 {
        let err = manager
            .download(req.clone(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(
            matches!(err, DownloadError::Checksum(ChecksumError::UnknownFormat(_))),
            "{err:?}"
        );
        assert!(!job.temp_path.exists());
    }

    assert!(fx.server.received_requests().await.unwrap().is_empty());
    let record = storage.find_artifact(&source_url).unwrap().unwrap();
    assert_eq!(record.state, "discarded");
}

#[tokio::test]
async fn test_persistent_server_error_exhausts_retries() {
    let fx = fixture().await;
    Mock::given(method("GET"))
        .and(path("/get.php"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&fx.server)
        .await;

    let req = request(&fx.server, "/get.php", &md5_hex(b"x"));
    let err = fx
        .manager
        .download(req, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        DownloadError::RetriesExhausted {
            start,
            attempts,
            source,
        } => {
            assert_eq!(start, 0);
            assert_eq!(attempts, 2);
            assert!(matches!(
                *source,
                DownloadError::HttpStatus { status: 503, .. }
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_redirect_with_changed_checksum_is_rejected() {
    let fx = fixture().await;
    let body = test_body(2_000);
    let checksum = md5_hex(&body);
    let other = md5_hex(b"substituted");

    Mock::given(path("/get.php"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "location",
            format!("{}/mirror/file?md5={}", fx.server.uri(), other).as_str(),
        ))
        .mount(&fx.server)
        .await;
    serve(&fx.server, "/mirror/file", RangeResponder::new(body)).await;

    let err = fx
        .manager
        .download(request(&fx.server, "/get.php", &checksum), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        DownloadError::RedirectRejected(RedirectViolation::ChecksumChanged {
            original,
            redirected,
            ..
        }) => {
            assert_eq!(original, checksum);
            assert_eq!(redirected, Some(other));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_redirect_with_same_checksum_is_followed() {
    let fx = fixture().await;
    let body = test_body(2_000);
    let checksum = md5_hex(&body);

    Mock::given(path("/get.php"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "location",
            format!("{}/mirror/file?md5={}", fx.server.uri(), checksum.to_uppercase()).as_str(),
        ))
        .mount(&fx.server)
        .await;
    serve(&fx.server, "/mirror/file", RangeResponder::new(body.clone())).await;

    let outcome = fx
        .manager
        .download(request(&fx.server, "/get.php", &checksum), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(std::fs::read(&outcome.path).unwrap(), body);
}

#[tokio::test]
async fn test_already_present_file_is_not_refetched() {
    let fx = fixture().await;
    let body = test_body(1_500);
    let checksum = md5_hex(&body);
    serve(&fx.server, "/get.php", RangeResponder::new(body.clone())).await;

    fx.manager
        .download(request(&fx.server, "/get.php", &checksum), &CancellationToken::new())
        .await
        .unwrap();
    let requests_after_first = fx.server.received_requests().await.unwrap().len();

    let second = fx
        .manager
        .download(request(&fx.server, "/get.php", &checksum), &CancellationToken::new())
        .await
        .unwrap();

    assert!(second.already_present);
    assert_eq!(second.bytes, body.len() as u64);
    assert_eq!(
        fx.server.received_requests().await.unwrap().len(),
        requests_after_first
    );
}

#[tokio::test]
async fn test_cancelled_download_keeps_no_final_file() {
    let fx = fixture().await;
    let body = test_body(3_000);
    let checksum = md5_hex(&body);
    serve(&fx.server, "/get.php", RangeResponder::new(body)).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let req = request(&fx.server, "/get.php", &checksum);
    let job = fx.manager.prepare_job(&req);

    let err = fx.manager.download(req, &cancel).await.unwrap_err();
    assert!(matches!(err, DownloadError::Cancelled), "{err:?}");
    assert!(!job.final_path.exists());
}

#[tokio::test]
async fn test_admission_gate_bounds_concurrency() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = download_config(dir.path());
    config.max_concurrent = 1;
    let manager = Arc::new(DownloadManager::new(direct_identity(&config), config));

    let body = test_body(1_500);
    let checksum = md5_hex(&body);
    let mut responder = RangeResponder::new(body.clone());
    responder.delay = Some(Duration::from_millis(200));
    serve(&server, "/get.php", responder).await;

    let spawn = |name: &'static str| {
        let manager = Arc::clone(&manager);
        let req = request(&server, "/get.php", &checksum).with_filename(name);
        tokio::spawn(async move { manager.download(req, &CancellationToken::new()).await })
    };
    let first = spawn("first.bin");
    let second = spawn("second.bin");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.available_slots(), 0);

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(std::fs::read(first.path).unwrap(), body);
    assert_eq!(std::fs::read(second.path).unwrap(), body);
    assert_eq!(manager.available_slots(), 1);
}
