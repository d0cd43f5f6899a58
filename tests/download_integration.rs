//! Integration tests for single transfers through `HttpClient`.
//!
//! These verify streaming, progress reporting, finalization and cleanup
//! against a mock HTTP server.

use std::path::Path;
use std::sync::{Arc, Mutex};

use appfetch_core::download::{DownloadError, HttpClient, partial_path};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::{socket_skip_return, start_mock_server_or_skip};

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return socket_skip_return();
        };
        mock_server
    }};
}

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Helper to mount a file endpoint on an existing mock server.
async fn mount_file(server: &MockServer, route: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(server)
        .await;
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn test_download_full_flow_preserves_content() -> TestResult {
    let mock_server = require_mock_server!();
    let content = b"This is the complete installer payload.\nLine 2.\nLine 3.";
    mount_file(&mock_server, "/installer.dmg", content).await;
    let temp_dir = TempDir::new()?;

    let client = HttpClient::new();
    let url = format!("{}/installer.dmg", mock_server.uri());
    let result = client
        .download(
            &url,
            temp_dir.path(),
            "Installer.dmg",
            &CancellationToken::new(),
            |_, _| {},
        )
        .await?;

    assert_eq!(result.path, temp_dir.path().join("Installer.dmg"));
    assert_eq!(result.bytes, content.len() as u64);
    assert_eq!(result.content_length, Some(content.len() as u64));
    assert_eq!(std::fs::read(&result.path)?, content);
    assert_eq!(dir_entries(temp_dir.path()), vec!["Installer.dmg"]);
    Ok(())
}

#[tokio::test]
async fn test_download_reports_cumulative_progress() -> TestResult {
    let mock_server = require_mock_server!();
    let content = vec![42_u8; 256 * 1024];
    mount_file(&mock_server, "/big.zip", &content).await;
    let temp_dir = TempDir::new()?;

    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);
    let client = HttpClient::new();
    let url = format!("{}/big.zip", mock_server.uri());
    client
        .download(
            &url,
            temp_dir.path(),
            "big.zip",
            &CancellationToken::new(),
            move |bytes, total| {
                if let Ok(mut guard) = sink.lock() {
                    guard.push((bytes, total));
                }
            },
        )
        .await?;

    let updates = updates.lock().map_err(|e| e.to_string())?.clone();
    assert!(!updates.is_empty(), "at least one progress callback expected");
    assert!(
        updates.windows(2).all(|pair| pair[0].0 <= pair[1].0),
        "byte counts must be cumulative"
    );
    let (last_bytes, last_total) = updates[updates.len() - 1];
    assert_eq!(last_bytes, content.len() as u64);
    assert_eq!(last_total, Some(content.len() as u64));
    Ok(())
}

#[tokio::test]
async fn test_download_overwrites_existing_file() -> TestResult {
    let mock_server = require_mock_server!();
    mount_file(&mock_server, "/app.zip", b"new build").await;
    let temp_dir = TempDir::new()?;
    let destination = temp_dir.path().join("app.zip");
    std::fs::write(&destination, b"an older and longer build")?;

    let client = HttpClient::new();
    let url = format!("{}/app.zip", mock_server.uri());
    let result = client
        .download(
            &url,
            temp_dir.path(),
            "app.zip",
            &CancellationToken::new(),
            |_, _| {},
        )
        .await?;

    assert_eq!(result.bytes, 9);
    assert_eq!(std::fs::read(&destination)?, b"new build");
    assert!(!partial_path(temp_dir.path(), "app.zip").exists());
    Ok(())
}

#[tokio::test]
async fn test_download_http_404_returns_status_error() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/gone.dmg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new()?;

    let client = HttpClient::new();
    let url = format!("{}/gone.dmg", mock_server.uri());
    let result = client
        .download(
            &url,
            temp_dir.path(),
            "gone.dmg",
            &CancellationToken::new(),
            |_, _| {},
        )
        .await;

    match result {
        Err(DownloadError::HttpStatus { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected HttpStatus error, got {other:?}"),
    }
    assert!(dir_entries(temp_dir.path()).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_download_http_500_returns_status_error() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new()?;

    let client = HttpClient::new();
    let url = format!("{}/broken", mock_server.uri());
    let error = client
        .download(
            &url,
            temp_dir.path(),
            "broken.bin",
            &CancellationToken::new(),
            |_, _| {},
        )
        .await
        .err()
        .ok_or("expected failure")?;

    assert!(error.to_string().contains("HTTP 500"), "got: {error}");
    Ok(())
}

#[tokio::test]
async fn test_download_empty_body_is_rejected() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new()?;

    let client = HttpClient::new();
    let url = format!("{}/empty", mock_server.uri());
    let result = client
        .download(
            &url,
            temp_dir.path(),
            "empty.bin",
            &CancellationToken::new(),
            |_, _| {},
        )
        .await;

    assert!(
        matches!(result, Err(DownloadError::EmptyPayload { .. })),
        "got {result:?}"
    );
    assert!(dir_entries(temp_dir.path()).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_download_truncated_body_removes_partial_file() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/truncated.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"BBB".to_vec())
                .insert_header("Content-Length", "20"),
        )
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new()?;

    let client = HttpClient::new();
    let url = format!("{}/truncated.bin", mock_server.uri());
    let result = client
        .download(
            &url,
            temp_dir.path(),
            "truncated.bin",
            &CancellationToken::new(),
            |_, _| {},
        )
        .await;

    assert!(result.is_err(), "truncated body should fail: {result:?}");
    assert!(dir_entries(temp_dir.path()).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_download_connection_refused_is_network_error() -> TestResult {
    let temp_dir = TempDir::new()?;
    let client = HttpClient::new();

    // Port 9 (discard) is not expected to accept HTTP connections locally.
    let result = client
        .download(
            "http://127.0.0.1:9/file.bin",
            temp_dir.path(),
            "file.bin",
            &CancellationToken::new(),
            |_, _| {},
        )
        .await;

    assert!(
        matches!(result, Err(DownloadError::Network { .. })),
        "got {result:?}"
    );
    Ok(())
}
