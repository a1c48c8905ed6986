//! End-to-end tests for the hnpipe-ingest binary
//!
//! Commands run against a wiremock upstream. `run` uses `--dry-run` so no
//! database is needed.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Helper to build the binary command pointed at the mock upstream
fn hnpipe(server: &MockServer) -> Command {
    let mut cmd = Command::cargo_bin("hnpipe-ingest").unwrap();
    cmd.env("HNPIPE_UPSTREAM_URL", server.uri())
        .env_remove("HNPIPE_BATCH_SIZE")
        .env_remove("HNPIPE_CONCURRENCY")
        .env_remove("HNPIPE_START_ID")
        .env_remove("HNPIPE_MAX_CYCLES")
        .env("LOG_LEVEL", "warn");
    cmd
}

async fn mount_item(server: &MockServer, id: i64, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v0/item/{id}.json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_inspect_prints_story_classification() {
    let server = MockServer::start().await;
    mount_item(
        &server,
        8863,
        json!({
            "id": 8863,
            "type": "story",
            "by": "dhouston",
            "title": "My YC app: Dropbox &amp; more",
            "time": 1175714200,
            "score": "not a number"
        }),
    )
    .await;

    hnpipe(&server)
        .arg("inspect")
        .arg("8863")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind": "story""#))
        .stdout(predicate::str::contains("My YC app: Dropbox & more"))
        .stdout(predicate::str::contains(r#""field": "score""#));
}

#[tokio::test]
async fn test_inspect_null_item_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/item/42.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;

    hnpipe(&server)
        .arg("inspect")
        .arg("42")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""outcome": "skipped""#))
        .stdout(predicate::str::contains("null_payload"));
}

#[tokio::test]
async fn test_inspect_upstream_error_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/item/1.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    hnpipe(&server)
        .arg("inspect")
        .arg("1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Upstream unavailable"));
}

#[tokio::test]
async fn test_dry_run_ingests_until_caught_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/maxitem.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("7"))
        .mount(&server)
        .await;
    mount_item(&server, 6, json!({"id": 6, "type": "comment", "text": "Hi&amp;bye", "parent": 1}))
        .await;
    mount_item(&server, 7, json!({"id": 7, "type": "story", "title": "T"})).await;

    hnpipe(&server)
        .args(["run", "--dry-run", "--start-id", "5", "--batch-size", "100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("items processed: 2"))
        .stdout(predicate::str::contains("cursor:          7"))
        .stdout(predicate::str::contains("caught up:       true"));
}

#[tokio::test]
async fn test_dry_run_respects_max_cycles() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/maxitem.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("10"))
        .mount(&server)
        .await;
    for id in 1..=10 {
        mount_item(&server, id, json!({"id": id, "type": "story"})).await;
    }

    hnpipe(&server)
        .args(["run", "--dry-run", "--batch-size", "3", "--max-cycles", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cycles:          2"))
        .stdout(predicate::str::contains("cursor:          6"))
        .stdout(predicate::str::contains("caught up:       false"));
}

#[tokio::test]
async fn test_run_rejects_zero_batch_size() {
    let server = MockServer::start().await;

    hnpipe(&server)
        .args(["run", "--dry-run", "--batch-size", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Batch size must be greater than 0"));
}

#[tokio::test]
async fn test_run_rejects_zero_max_cycles() {
    let server = MockServer::start().await;

    hnpipe(&server)
        .args(["run", "--dry-run", "--max-cycles", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Max cycles must be greater than 0"));
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("hnpipe-ingest")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("migrate"));
}
