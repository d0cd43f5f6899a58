//! Integration tests for release lookups.

use std::collections::BTreeMap;
use std::sync::Arc;

use appfetch_core::queue::Batch;
use appfetch_core::resolver::{ReleaseResolver, ResolveError};
use appfetch_core::{Catalog, DownloadDefinition, ItemStatus, MarkerRule};
use wiremock::matchers::{header, method, path};
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

const RELEASE_PATH: &str = "/repos/acme/studio/releases/latest";

fn rule(server: &MockServer) -> MarkerRule {
    MarkerRule {
        endpoint: format!("{}{RELEASE_PATH}", server.uri()),
        platform: "mac".to_string(),
        extension: ".dmg".to_string(),
    }
}

fn resolver() -> Result<ReleaseResolver, reqwest::Error> {
    ReleaseResolver::new(5)
}

async fn mount_release(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(RELEASE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_lookup_returns_first_matching_asset() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path(RELEASE_PATH))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tag_name": "v3.1.0",
            "assets": [
                { "name": "Studio-3.1.0-win-x64.exe", "browser_download_url": "https://dl.example.com/win.exe" },
                { "name": "Studio-3.1.0-mac-arm64.dmg", "browser_download_url": "https://dl.example.com/mac-arm64.dmg" },
                { "name": "Studio-3.1.0-mac-x64.dmg", "browser_download_url": "https://dl.example.com/mac-x64.dmg" }
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = resolver()?.lookup(&rule(&mock_server)).await?;

    assert_eq!(url, "https://dl.example.com/mac-arm64.dmg");
    Ok(())
}

#[tokio::test]
async fn test_lookup_skips_assets_missing_fields() -> TestResult {
    let mock_server = require_mock_server!();
    mount_release(
        &mock_server,
        serde_json::json!({
            "assets": [
                { "name": "Studio-mac.dmg" },
                { "browser_download_url": "https://dl.example.com/unnamed.dmg" },
                { "name": "Studio-MAC-universal.DMG", "browser_download_url": "https://dl.example.com/universal.dmg" }
            ]
        }),
    )
    .await;

    let url = resolver()?.lookup(&rule(&mock_server)).await?;

    assert_eq!(url, "https://dl.example.com/universal.dmg");
    Ok(())
}

#[tokio::test]
async fn test_lookup_without_match_reports_no_matching_asset() -> TestResult {
    let mock_server = require_mock_server!();
    mount_release(
        &mock_server,
        serde_json::json!({
            "assets": [
                { "name": "Studio-win.exe", "browser_download_url": "https://dl.example.com/win.exe" },
                { "name": "Studio-mac.zip", "browser_download_url": "https://dl.example.com/mac.zip" }
            ]
        }),
    )
    .await;

    let error = resolver()?
        .lookup(&rule(&mock_server))
        .await
        .err()
        .ok_or("lookup should fail")?;

    assert!(
        matches!(error, ResolveError::NoMatchingAsset { .. }),
        "got {error:?}"
    );
    assert_eq!(error.item_reason(), "no matching asset in release");
    Ok(())
}

#[tokio::test]
async fn test_lookup_server_error_reports_fetch_failed() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path(RELEASE_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let error = resolver()?
        .lookup(&rule(&mock_server))
        .await
        .err()
        .ok_or("lookup should fail")?;

    assert!(
        matches!(error, ResolveError::FetchFailed { .. }),
        "got {error:?}"
    );
    assert_eq!(error.item_reason(), "could not fetch release info");
    assert!(error.to_string().contains("503"), "got: {error}");
    Ok(())
}

#[tokio::test]
async fn test_lookup_invalid_json_reports_fetch_failed() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path(RELEASE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
        .mount(&mock_server)
        .await;

    let error = resolver()?
        .lookup(&rule(&mock_server))
        .await
        .err()
        .ok_or("lookup should fail")?;

    assert_eq!(error.item_reason(), "could not fetch release info");
    Ok(())
}

#[tokio::test]
async fn test_lookup_missing_assets_list_reports_fetch_failed() -> TestResult {
    let mock_server = require_mock_server!();
    mount_release(&mock_server, serde_json::json!({ "message": "Not Found" })).await;

    let error = resolver()?
        .lookup(&rule(&mock_server))
        .await
        .err()
        .ok_or("lookup should fail")?;

    assert!(matches!(error, ResolveError::FetchFailed { .. }));
    Ok(())
}

fn marker_batch(server: &MockServer) -> Result<Batch, Box<dyn std::error::Error>> {
    let catalog = Catalog::new(
        vec![
            DownloadDefinition::new("Studio", "Studio.dmg", "LATEST_STUDIO"),
            DownloadDefinition::new("Studio beta", "Studio-beta.dmg", "LATEST_STUDIO"),
        ],
        BTreeMap::from([("LATEST_STUDIO".to_string(), rule(server))]),
    )?;
    Ok(Batch::from_catalog(&catalog))
}

#[tokio::test]
async fn test_resolve_group_assigns_url_to_every_member() -> TestResult {
    let mock_server = require_mock_server!();
    mount_release(
        &mock_server,
        serde_json::json!({
            "assets": [{ "name": "studio-mac.dmg", "browser_download_url": "https://dl.example.com/s.dmg" }]
        }),
    )
    .await;
    let batch = marker_batch(&mock_server)?;
    let items: Vec<_> = batch.items().iter().map(Arc::clone).collect();

    let url = resolver()?
        .resolve_group(&rule(&mock_server), &items)
        .await?;

    assert_eq!(url, "https://dl.example.com/s.dmg");
    for item in &items {
        assert_eq!(item.status(), ItemStatus::Queued);
        assert_eq!(item.resolved_url().as_deref(), Some("https://dl.example.com/s.dmg"));
    }
    assert!(batch.unresolved_groups().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_resolve_group_failure_fails_every_member() -> TestResult {
    let mock_server = require_mock_server!();
    mount_release(&mock_server, serde_json::json!({ "assets": [] })).await;
    let batch = marker_batch(&mock_server)?;
    let items: Vec<_> = batch.items().iter().map(Arc::clone).collect();

    let result = resolver()?
        .resolve_group(&rule(&mock_server), &items)
        .await;

    assert!(result.is_err());
    for item in &items {
        assert_eq!(
            item.status(),
            ItemStatus::Failed("no matching asset in release".to_string())
        );
        assert_eq!(item.resolved_url(), None);
    }
    Ok(())
}
