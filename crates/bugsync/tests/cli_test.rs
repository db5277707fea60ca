//! Integration tests for the `bugsync` CLI binary.
//!
//! Argument parsing, help output, configuration, and the offline queue,
//! against a wiremock server where the network is needed.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// A `bugsync` command whose config and data directories live under `home`.
///
/// Clears every `BUGSYNC_*` variable so tests never see the user's setup.
fn bugsync_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("bugsync");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env_remove("RUST_LOG")
        .env_remove("NO_COLOR")
        .env_remove("BUGSYNC_PROFILE")
        .env_remove("BUGSYNC_SERVER")
        .env_remove("BUGSYNC_TOKEN")
        .env_remove("BUGSYNC_CACHE_DIR")
        .env_remove("BUGSYNC_OUTPUT")
        .env_remove("BUGSYNC_INSECURE")
        .env_remove("BUGSYNC_TIMEOUT")
        .env_remove("BUGSYNC_DEFAULT_PROFILE");
    cmd
}

/// A command already pointed at `server` with a token and a private cache.
fn online_cmd(home: &TempDir, server: &str) -> assert_cmd::Command {
    let mut cmd = bugsync_cmd(home.path());
    cmd.args(["--server", server, "--token", "t0ken", "--color", "never"])
        .arg("--cache-dir")
        .arg(home.path().join("cache"));
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = TempDir::new().unwrap();
    let output = bugsync_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    bugsync_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("list")
            .and(predicate::str::contains("save"))
            .and(predicate::str::contains("sync"))
            .and(predicate::str::contains("pending"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    bugsync_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bugsync"));
}

#[test]
fn test_completions_zsh() {
    let home = TempDir::new().unwrap();
    bugsync_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_invalid_output_format() {
    let home = TempDir::new().unwrap();
    let output = bugsync_cmd(home.path())
        .args(["--output", "xml", "list"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("possible values"));
}

// ── Configuration errors ────────────────────────────────────────────

#[test]
fn test_list_without_config() {
    let home = TempDir::new().unwrap();
    bugsync_cmd(home.path())
        .arg("list")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_unknown_profile_names_available_ones() {
    let home = TempDir::new().unwrap();
    bugsync_cmd(home.path())
        .args(["config", "init", "--url", "http://localhost:1", "--name", "work"])
        .assert()
        .success();

    bugsync_cmd(home.path())
        .args(["--profile", "home", "list"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("work"));
}

#[test]
fn test_missing_token_is_an_auth_error() {
    let home = TempDir::new().unwrap();
    bugsync_cmd(home.path())
        .args(["--server", "http://localhost:1", "list"])
        .arg("--cache-dir")
        .arg(home.path().join("cache"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No credentials"));
}

#[test]
fn test_config_init_show_and_path() {
    let home = TempDir::new().unwrap();
    bugsync_cmd(home.path())
        .args(["config", "init", "--url", "https://bugs.example.com", "--reconnect"])
        .assert()
        .success();

    let output = bugsync_cmd(home.path())
        .args(["-o", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let cfg = stdout_json(&output);
    assert_eq!(cfg["default_profile"], "default");
    assert_eq!(cfg["profiles"]["default"]["server"], "https://bugs.example.com");
    assert_eq!(cfg["profiles"]["default"]["reconnect"], true);

    bugsync_cmd(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));

    // A second init of the same name needs --force.
    bugsync_cmd(home.path())
        .args(["config", "init", "--url", "https://other.example.com"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn test_config_init_rejects_bad_url() {
    let home = TempDir::new().unwrap();
    bugsync_cmd(home.path())
        .args(["config", "init", "--url", "not a url"])
        .assert()
        .code(2);
}

// ── Offline behavior ────────────────────────────────────────────────

#[test]
fn test_save_while_offline_is_refused() {
    let home = TempDir::new().unwrap();
    online_cmd(&home, "http://localhost:1")
        .args(["--offline", "save", "--title", "Crash"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("offline"));
}

#[test]
fn test_save_without_title_is_a_usage_error() {
    let home = TempDir::new().unwrap();
    online_cmd(&home, "http://localhost:1")
        .args(["save", "--priority", "2"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("title"));
}

#[test]
fn test_login_token_is_used_until_logout() {
    let home = TempDir::new().unwrap();
    let cache = home.path().join("cache");

    bugsync_cmd(home.path())
        .args(["--token", "stored"])
        .arg("--cache-dir")
        .arg(&cache)
        .arg("login")
        .assert()
        .success()
        .stderr(predicate::str::contains("Token stored"));

    let output = bugsync_cmd(home.path())
        .args(["--server", "http://localhost:1", "--offline", "-o", "json", "pending"])
        .arg("--cache-dir")
        .arg(&cache)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(stdout_json(&output), json!([]));

    bugsync_cmd(home.path())
        .arg("--cache-dir")
        .arg(&cache)
        .arg("logout")
        .assert()
        .success();

    bugsync_cmd(home.path())
        .args(["--server", "http://localhost:1", "--offline", "pending"])
        .arg("--cache-dir")
        .arg(&cache)
        .assert()
        .code(3);
}

// ── Against a server ────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_list_refreshes_then_serves_cache_offline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/bug"))
        .and(header("authorization", "Bearer t0ken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "_id": "1", "title": "Crash on start", "priority": 3 },
            { "_id": "2", "title": "Typo", "priority": 1 }
        ])))
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();

    let output = online_cmd(&home, &server.uri())
        .args(["-o", "json", "list"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let bugs = stdout_json(&output);
    assert_eq!(bugs.as_array().unwrap().len(), 2);
    assert_eq!(bugs[0]["title"], "Crash on start");
    assert_eq!(bugs[0]["status"], 0);

    // The server is not consulted again; the cache answers.
    online_cmd(&home, "http://localhost:1")
        .args(["--offline", "-o", "plain", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1").and(predicate::str::contains("2")));

    online_cmd(&home, "http://localhost:1")
        .args(["--offline", "show", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Typo"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_save_is_queued_and_synced_later() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/bug"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/bug"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "_id": "42", "title": "Offline bug", "priority": 2 })),
        )
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();

    online_cmd(&home, &server.uri())
        .args(["save", "--title", "Offline bug", "--priority", "2"])
        .assert()
        .success()
        .stderr(predicate::str::contains("queued"));

    online_cmd(&home, &server.uri())
        .args(["-o", "plain", "pending"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("local-"));

    online_cmd(&home, &server.uri())
        .args(["-o", "plain", "sync"])
        .assert()
        .success()
        .stdout(predicate::str::contains("synced=1 removed=0 failed=0 skipped=0"));

    online_cmd(&home, &server.uri())
        .args(["-o", "plain", "pending"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    online_cmd(&home, &server.uri())
        .args(["--offline", "-o", "plain", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_with_rejected_record_exits_incomplete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/bug"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();

    online_cmd(&home, &server.uri())
        .args(["save", "--title", "Never accepted"])
        .assert()
        .success();

    online_cmd(&home, &server.uri())
        .arg("sync")
        .assert()
        .code(6)
        .stderr(predicate::str::contains("could not be synchronized"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delete_of_unknown_bug_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/bug"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();

    online_cmd(&home, &server.uri())
        .args(["delete", "99"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("99"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ephemeral_run_leaves_no_cache_behind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/bug"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "_id": "5", "title": "Flaky" }])),
        )
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();
    let uri = server.uri();

    let output = bugsync_cmd(home.path())
        .args(["--server", uri.as_str(), "--token", "t0ken", "--ephemeral"])
        .args(["-o", "json", "list"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(stdout_json(&output)[0]["_id"], "5");
    assert!(!home.path().join("data").exists());
}
