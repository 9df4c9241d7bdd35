//! End-to-end CLI tests driving the compiled binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("pwclientrc");
    std::fs::write(&path, contents).unwrap();
    path
}

fn pwclient() -> Command {
    let mut cmd = Command::cargo_bin("pwclient").unwrap();
    // Keep the user's real config out of the picture.
    cmd.env("PWCLIENTRC", "/nonexistent/pwclientrc");
    cmd
}

#[test]
fn missing_config_file_fails() {
    pwclient()
        .arg("projects")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn unknown_project_fails_before_any_network_access() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        "[options]\ndefault = alpha\n\n[alpha]\nurl = https://example.invalid/api\n",
    );

    pwclient()
        .args(["list", "-p", "gamma"])
        .env("PWCLIENTRC", &config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no project 'gamma' is configured"));
}

#[test]
fn no_default_and_no_flag_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "[options]\n\n[alpha]\nurl = https://example.invalid/api\n");

    pwclient()
        .arg("projects")
        .env("PWCLIENTRC", &config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no project specified"));
}

#[test]
fn ambiguous_url_asks_for_explicit_backend() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        "[options]\ndefault = alpha\n\n[alpha]\nurl = https://example.invalid/patchwork\n",
    );

    pwclient()
        .arg("projects")
        .env("PWCLIENTRC", &config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("backend = rest"));
}

#[test]
fn token_with_xmlrpc_backend_fails_at_startup() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        "[options]\ndefault = alpha\n\n\
         [alpha]\nurl = https://example.invalid/xmlrpc/\ntoken = sekrit\n",
    );

    pwclient()
        .arg("projects")
        .env("PWCLIENTRC", &config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not support API tokens"));
}

#[test]
fn update_refuses_commit_ref_with_multiple_ids() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        "[options]\ndefault = alpha\n\n[alpha]\nurl = https://example.invalid/api\n",
    );

    pwclient()
        .args(["update", "--commit-ref", "abc123", "--state", "accepted", "1", "2"])
        .env("PWCLIENTRC", &config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("single patch id"));
}

#[tokio::test(flavor = "multi_thread")]
async fn list_prints_a_patch_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/patches/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 1157169,
            "date": "2024-01-01T00:00:00",
            "name": "[v2] mm: fix the thing",
            "msgid": "<a@b.example.com>",
            "state": "Under Review",
            "archived": false,
            "project": {"name": "alpha"},
            "submitter": {"name": "Jane Doe", "email": "jane@example.com"},
            "delegate": null,
        }])))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        &format!(
            "[options]\ndefault = alpha\n\n[alpha]\nurl = {}/api\n",
            server.uri()
        ),
    );

    let assert = tokio::task::spawn_blocking(move || {
        pwclient()
            .arg("list")
            .env("PWCLIENTRC", &config)
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("ID"))
        .stdout(predicate::str::contains(
            "1157169 Under Review [v2] mm: fix the thing",
        ));
}

#[tokio::test(flavor = "multi_thread")]
async fn legacy_config_still_resolves_and_lists() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/patches/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        &format!(
            "[base]\nurl = {}/api\nproject = alpha\n\n[auth]\nusername = jane\npassword = hunter2\n",
            server.uri()
        ),
    );

    let assert = tokio::task::spawn_blocking(move || {
        pwclient()
            .arg("list")
            .env("PWCLIENTRC", &config)
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stderr(predicate::str::contains("legacy"));
}
