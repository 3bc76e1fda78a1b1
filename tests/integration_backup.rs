// gbak: GitHub account backup tool
//
// SPDX-FileCopyrightText: 2024 Yannis Charalambidis
// SPDX-License-Identifier: MIT

//! End-to-end backup runs against a mock API and archive host.
//!
//! Covers:
//! - Default-branch and all-branches runs
//! - Search pagination
//! - Destination validation before any request
//! - Cancellation between archives and during a backoff
//! - Partial archives removed after an interrupted transfer
//! - Error exit codes for HTTP and decoding failures

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use gbak::backup::{
    ArchiveFormat, BackupOptions, BackupOrchestrator, BackupReport, Outcome, ProgressDisplay,
};
use gbak::cancel::Cancellation;
use gbak::config::ApiConfig;
use gbak::error::GbakResult;
use gbak::net::{RateLimitPolicy, RateLimitedClient};
use serde_json::json;
use wiremock::matchers::{any, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const ACCOUNT: &str = "octocat";

fn api_for(server: &MockServer) -> ApiConfig {
    ApiConfig {
        base_url: server.uri(),
        archive_url: server.uri(),
        ..Default::default()
    }
}

struct Run<'a> {
    server: &'a MockServer,
    archive_url: Option<String>,
    destination: &'a Path,
    all_branches: bool,
    format: ArchiveFormat,
    token: Option<&'a str>,
    cancel: Cancellation,
}

impl<'a> Run<'a> {
    fn new(server: &'a MockServer, destination: &'a Path) -> Self {
        Self {
            server,
            archive_url: None,
            destination,
            all_branches: false,
            format: ArchiveFormat::Zip,
            token: None,
            cancel: Cancellation::new(),
        }
    }

    async fn go(self) -> GbakResult<BackupReport> {
        let mut api = api_for(self.server);
        if let Some(archive_url) = self.archive_url {
            api.archive_url = archive_url;
        }
        let client = RateLimitedClient::new(
            &api,
            RateLimitPolicy::new(10, 2, Duration::from_millis(10)),
            self.token.map(str::to_string),
            self.cancel,
        )?;
        let options = BackupOptions::builder()
            .account(ACCOUNT)
            .destination(self.destination)
            .all_branches(self.all_branches)
            .format(self.format)
            .progress(ProgressDisplay::Silent)
            .build();
        BackupOrchestrator::new(client, api, options).run().await
    }
}

fn repo(name: &str, default_branch: &str) -> serde_json::Value {
    json!({
        "id": 1,
        "name": name,
        "full_name": format!("{ACCOUNT}/{name}"),
        "private": false,
        "default_branch": default_branch,
    })
}

fn search_body(repos: &[serde_json::Value]) -> serde_json::Value {
    json!({
        "total_count": repos.len(),
        "incomplete_results": false,
        "items": repos,
    })
}

async fn mount_search(server: &MockServer, repos: &[serde_json::Value]) {
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .and(query_param("q", "user:octocat"))
        .and(query_param("per_page", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(repos)))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_archive(server: &MockServer, archive_path: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(archive_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .expect(1)
        .mount(server)
        .await;
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Cancels the run while serving the archive body.
struct CancelWhileServing {
    cancel: Cancellation,
    body: Vec<u8>,
}

impl Respond for CancelWhileServing {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.cancel.request();
        ResponseTemplate::new(200).set_body_bytes(self.body.clone())
    }
}

/// Cancels the run and reports a nearly exhausted quota.
struct CancelWithLowQuota {
    cancel: Cancellation,
}

impl Respond for CancelWithLowQuota {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.cancel.request();
        ResponseTemplate::new(200)
            .insert_header("x-ratelimit-remaining", "1")
            .set_body_bytes(b"never written".to_vec())
    }
}

/// Serves one response that announces `declared` body bytes but sends
/// only `body` before closing the connection.
fn serve_truncated(declared: usize, body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\nConnection: close\r\n\r\n"
        );
        stream.write_all(head.as_bytes()).unwrap();
        stream.write_all(body).unwrap();
        stream.flush().unwrap();
    });
    format!("http://{addr}")
}

// =============================================================================
// Successful runs
// =============================================================================

#[tokio::test]
async fn test_default_branch_backup() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();
    let body = b"PK\x03\x04 hello world archive";

    mount_search(&server, &[repo("Hello-World", "master")]).await;
    mount_archive(&server, "/octocat/Hello-World/archive/refs/heads/master.zip", body).await;

    let report = Run::new(&server, dest.path()).go().await.unwrap();

    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.session_dir.parent().unwrap(), dest.path());
    assert_eq!(
        report.session_dir.file_name().unwrap().to_string_lossy(),
        report.timestamp
    );
    assert_eq!(dir_entries(&report.session_dir), ["Hello-World_master.zip"]);

    let written = std::fs::read(report.session_dir.join("Hello-World_master.zip")).unwrap();
    assert_eq!(written, body);
    assert_eq!(report.bytes_total, body.len() as u64);
    assert_eq!(report.files.len(), 1);
}

#[tokio::test]
async fn test_default_mode_never_lists_branches() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    mount_search(
        &server,
        &[repo("Hello-World", "master"), repo("Spoon-Knife", "main")],
    )
    .await;
    mount_archive(&server, "/octocat/Hello-World/archive/refs/heads/master.zip", b"a").await;
    mount_archive(&server, "/octocat/Spoon-Knife/archive/refs/heads/main.zip", b"b").await;
    Mock::given(path("/repos/octocat/Hello-World/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(path("/repos/octocat/Spoon-Knife/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let report = Run::new(&server, dest.path()).go().await.unwrap();

    assert_eq!(
        dir_entries(&report.session_dir),
        ["Hello-World_master.zip", "Spoon-Knife_main.zip"]
    );
}

#[tokio::test]
async fn test_all_branches_backup() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    mount_search(&server, &[repo("Spoon-Knife", "main"), repo("empty", "main")]).await;
    Mock::given(path("/repos/octocat/Spoon-Knife/branches"))
        .and(query_param("per_page", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "main", "protected": true },
            { "name": "feature/x", "protected": false },
            { "name": "test-branch", "protected": false },
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/repos/octocat/empty/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    mount_archive(&server, "/octocat/Spoon-Knife/archive/refs/heads/main.zip", b"1").await;
    mount_archive(&server, "/octocat/Spoon-Knife/archive/refs/heads/feature/x.zip", b"22").await;
    mount_archive(&server, "/octocat/Spoon-Knife/archive/refs/heads/test-branch.zip", b"333")
        .await;

    let mut run = Run::new(&server, dest.path());
    run.all_branches = true;
    let report = run.go().await.unwrap();

    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.files.len(), 3);
    assert_eq!(report.bytes_total, 6);
    assert_eq!(
        dir_entries(&report.session_dir),
        [
            "Spoon-Knife_feature%2Fx.zip",
            "Spoon-Knife_main.zip",
            "Spoon-Knife_test-branch.zip"
        ]
    );
    // Files are recorded in download order
    assert!(report.files[0].ends_with("Spoon-Knife_main.zip"));
    assert!(report.files[2].ends_with("Spoon-Knife_test-branch.zip"));
}

#[tokio::test]
async fn test_search_pagination_follows_link() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();
    let next = format!(
        "{}/search/repositories?q=user%3Aoctocat&per_page=100&page=2",
        server.uri()
    );

    Mock::given(path("/search/repositories"))
        .and(query_param_is_missing("page"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(search_body(&[repo("one", "main"), repo("two", "main")]))
                .insert_header("link", format!("<{next}>; rel=\"next\"").as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/search/repositories"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&[repo("three", "dev")])))
        .expect(1)
        .mount(&server)
        .await;
    mount_archive(&server, "/octocat/one/archive/refs/heads/main.zip", b"1").await;
    mount_archive(&server, "/octocat/two/archive/refs/heads/main.zip", b"2").await;
    mount_archive(&server, "/octocat/three/archive/refs/heads/dev.zip", b"3").await;

    let report = Run::new(&server, dest.path()).go().await.unwrap();

    assert_eq!(
        dir_entries(&report.session_dir),
        ["one_main.zip", "three_dev.zip", "two_main.zip"]
    );
    assert!(report.files[2].ends_with("three_dev.zip"));
}

#[tokio::test]
async fn test_tar_gz_format() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    mount_search(&server, &[repo("Hello-World", "master")]).await;
    mount_archive(
        &server,
        "/octocat/Hello-World/archive/refs/heads/master.tar.gz",
        b"\x1f\x8b",
    )
    .await;

    let mut run = Run::new(&server, dest.path());
    run.format = ArchiveFormat::TarGz;
    let report = run.go().await.unwrap();

    assert_eq!(dir_entries(&report.session_dir), ["Hello-World_master.tar.gz"]);
}

#[tokio::test]
async fn test_no_repositories_still_creates_session() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();
    mount_search(&server, &[]).await;

    let report = Run::new(&server, dest.path()).go().await.unwrap();

    assert_eq!(report.outcome, Outcome::Completed);
    assert!(report.session_dir.is_dir());
    assert!(dir_entries(&report.session_dir).is_empty());
    assert_eq!(report.bytes_total, 0);
}

#[tokio::test]
async fn test_token_sent_on_every_request() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    Mock::given(path("/search/repositories"))
        .and(header("authorization", "Bearer ghp_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&[repo("private", "main")])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/octocat/private/archive/refs/heads/main.zip"))
        .and(header("authorization", "Bearer ghp_test"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"secret".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let mut run = Run::new(&server, dest.path());
    run.token = Some("ghp_test");
    let report = run.go().await.unwrap();

    assert_eq!(report.files.len(), 1);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_missing_destination_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dest = tempfile::tempdir().unwrap();
    let missing = dest.path().join("does-not-exist");

    let err = Run::new(&server, &missing).go().await.unwrap_err();

    assert_eq!(err.exit_code(), 2);
    assert!(!missing.exists());
}

#[tokio::test]
async fn test_archive_404_fails_run() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    mount_search(&server, &[repo("gone", "main")]).await;
    Mock::given(path("/octocat/gone/archive/refs/heads/main.zip"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .expect(1)
        .mount(&server)
        .await;

    let err = Run::new(&server, dest.path()).go().await.unwrap_err();

    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("404"));

    // The session directory exists but holds no partial archive
    let sessions = dir_entries(dest.path());
    assert_eq!(sessions.len(), 1);
    assert!(dir_entries(&dest.path().join(&sessions[0])).is_empty());
}

#[tokio::test]
async fn test_malformed_search_response_fails_before_downloads() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    Mock::given(path("/search/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "total_count": 1 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/octocat/Hello-World/archive/refs/heads/master.zip"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = Run::new(&server, dest.path()).go().await.unwrap_err();

    assert_eq!(err.exit_code(), 5);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_after_first_archive() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();
    let cancel = Cancellation::new();

    mount_search(&server, &[repo("Spoon-Knife", "main")]).await;
    Mock::given(path("/repos/octocat/Spoon-Knife/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "main" },
            { "name": "dev" },
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/octocat/Spoon-Knife/archive/refs/heads/main.zip"))
        .respond_with(CancelWhileServing {
            cancel: cancel.clone(),
            body: b"first".to_vec(),
        })
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/octocat/Spoon-Knife/archive/refs/heads/dev.zip"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut run = Run::new(&server, dest.path());
    run.all_branches = true;
    run.cancel = cancel;
    let report = run.go().await.unwrap();

    assert_eq!(report.outcome, Outcome::Cancelled);
    assert_eq!(dir_entries(&report.session_dir), ["Spoon-Knife_main.zip"]);
    assert_eq!(report.bytes_total, 5);
}

#[tokio::test]
async fn test_cancel_before_start_downloads_nothing() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();
    let cancel = Cancellation::new();
    cancel.request();

    mount_search(&server, &[repo("Hello-World", "master")]).await;
    Mock::given(path("/octocat/Hello-World/archive/refs/heads/master.zip"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut run = Run::new(&server, dest.path());
    run.cancel = cancel;
    let report = run.go().await.unwrap();

    assert_eq!(report.outcome, Outcome::Cancelled);
    assert!(report.files.is_empty());
    assert!(report.session_dir.is_dir());
}

#[tokio::test]
async fn test_interrupted_transfer_removes_partial_archive() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();
    mount_search(&server, &[repo("Hello-World", "master")]).await;

    let mut run = Run::new(&server, dest.path());
    run.archive_url = Some(serve_truncated(1000, b"PK\x03\x04"));
    let err = run.go().await.unwrap_err();

    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("transfer interrupted"));

    let sessions = dir_entries(dest.path());
    assert_eq!(sessions.len(), 1);
    assert!(dir_entries(&dest.path().join(&sessions[0])).is_empty());
}

#[tokio::test]
async fn test_cancel_during_archive_backoff_writes_nothing() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();
    let cancel = Cancellation::new();

    mount_search(&server, &[repo("Hello-World", "master")]).await;
    Mock::given(path("/octocat/Hello-World/archive/refs/heads/master.zip"))
        .respond_with(CancelWithLowQuota {
            cancel: cancel.clone(),
        })
        .expect(1)
        .mount(&server)
        .await;

    let mut run = Run::new(&server, dest.path());
    run.cancel = cancel;
    let report = run.go().await.unwrap();

    assert_eq!(report.outcome, Outcome::Cancelled);
    assert_eq!(report.bytes_total, 0);
    assert!(report.files.is_empty());
    assert!(dir_entries(&report.session_dir).is_empty());
}
