//! End-to-end CLI tests for the appfetch binary.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
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

fn appfetch() -> Command {
    let mut cmd = Command::cargo_bin("appfetch").unwrap();
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_binary_help_displays_usage() {
    appfetch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Fetch the latest installers"))
        .stdout(predicate::str::contains("--concurrency"));
}

#[test]
fn test_binary_version_displays_version() {
    appfetch()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("appfetch"));
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    appfetch()
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_rejects_out_of_range_concurrency() {
    for value in ["0", "101"] {
        appfetch()
            .args(["--concurrency", value, "--list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("concurrency"));
    }
}

#[test]
fn test_list_prints_builtin_catalog() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "");

    appfetch()
        .arg("--config")
        .arg(&config)
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains("<GITHUB_LATEST>"));
}

#[test]
fn test_list_prints_catalog_from_config_file() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[[downloads]]
name = "Editor"
file_name = "Editor.dmg"
url = "https://downloads.example.com/Editor.dmg"

[[downloads]]
name = "Studio"
file_name = "Studio.dmg"
url = "LATEST_STUDIO"

[markers.LATEST_STUDIO]
endpoint = "https://api.example.com/repos/acme/studio/releases/latest"
platform = "mac"
extension = ".dmg"
"#,
    );

    appfetch()
        .arg("--config")
        .arg(&config)
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Editor.dmg"))
        .stdout(predicate::str::contains("https://downloads.example.com/Editor.dmg"))
        .stdout(predicate::str::contains("<LATEST_STUDIO>"));
}

#[test]
fn test_invalid_config_file_fails_with_message() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "concurrency = 0\n");

    appfetch()
        .arg("--config")
        .arg(&config)
        .arg("--list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_unknown_config_key_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "colour = \"blue\"\n");

    appfetch()
        .arg("--config")
        .arg(&config)
        .arg("--list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_run_downloads_catalog_and_prints_json() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/files/one.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"one".to_vec()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/two.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"two".to_vec()))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let config = write_config(
        dir.path(),
        &format!(
            r#"
[[downloads]]
name = "One"
file_name = "one.zip"
url = "{uri}/files/one.zip"

[[downloads]]
name = "Two"
file_name = "two.zip"
url = "{uri}/files/two.zip"
"#,
            uri = mock_server.uri()
        ),
    );

    let assert = appfetch()
        .arg("--config")
        .arg(&config)
        .arg("--output-dir")
        .arg(&out)
        .arg("--json")
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["all_complete"], serde_json::Value::Bool(true));
    assert_eq!(json["phase"], "complete");
    assert_eq!(json["items"][0]["status"]["state"], "completed");
    assert_eq!(std::fs::read(out.join("one.zip")).unwrap(), b"one");
    assert_eq!(std::fs::read(out.join("two.zip")).unwrap(), b"two");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_partial_failure_exits_with_code_two() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/files/ok.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/missing.zip"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        &format!(
            r#"
concurrency = 1

[[downloads]]
name = "Ok"
file_name = "ok.zip"
url = "{uri}/files/ok.zip"

[[downloads]]
name = "Missing"
file_name = "missing.zip"
url = "{uri}/files/missing.zip"
"#,
            uri = mock_server.uri()
        ),
    );

    appfetch()
        .arg("--config")
        .arg(&config)
        .arg("--output-dir")
        .arg(dir.path().join("out"))
        .assert()
        .code(2)
        .stdout(predicate::str::contains("1 done, 0 downloading, 0 queued, 1 failed"))
        .stdout(predicate::str::contains("HTTP 404"));
}
