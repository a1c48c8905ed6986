//! End-to-end ingestion tests
//!
//! The real HTTP client runs against a wiremock upstream and the pipeline
//! commits into the in-memory store, so no database is needed.

use chrono::{TimeZone, Utc};
use hnpipe_ingest::config::UpstreamConfig;
use hnpipe_ingest::models::{Comment, ItemId, Story};
use hnpipe_ingest::store::MemoryTables;
use hnpipe_ingest::{
    HackerNewsClient, IngestConfig, IngestError, IngestionLoop, ItemStore, MemoryItemStore,
};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to serve `/v0/maxitem.json`
async fn mount_max_item(server: &MockServer, max: ItemId) {
    Mock::given(method("GET"))
        .and(path("/v0/maxitem.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(max.to_string()))
        .mount(server)
        .await;
}

/// Helper to serve one item body
async fn mount_item(server: &MockServer, id: ItemId, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v0/item/{id}.json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn client_for(server: &MockServer) -> Arc<HackerNewsClient> {
    let config = UpstreamConfig {
        base_url: server.uri(),
        ..UpstreamConfig::default()
    };
    Arc::new(HackerNewsClient::new(&config).expect("Failed to build client"))
}

fn config(start_id: ItemId, batch_size: usize) -> IngestConfig {
    IngestConfig {
        start_id,
        batch_size,
        concurrency: 4,
        ..IngestConfig::default()
    }
}

#[tokio::test]
async fn test_single_cycle_comment_and_story() {
    let server = MockServer::start().await;
    mount_max_item(&server, 7).await;
    mount_item(
        &server,
        6,
        json!({"id": 6, "type": "comment", "text": "Hi&amp;bye", "time": 1_700_000_000, "by": "a", "parent": 1}),
    )
    .await;
    mount_item(
        &server,
        7,
        json!({"id": 7, "type": "story", "title": "T", "time": 1_700_000_100, "by": "b"}),
    )
    .await;

    let store = Arc::new(MemoryItemStore::new());
    let mut pipeline = IngestionLoop::new(client_for(&server), store.clone(), &config(5, 100));
    let summary = pipeline.run().await.expect("Run failed");

    assert_eq!(summary.cycles, 1);
    assert_eq!(summary.items_processed, 2);
    assert_eq!(summary.final_cursor, 7);
    assert!(summary.caught_up);

    let tables = store.snapshot().await;
    assert_eq!(
        tables.comments.values().collect::<Vec<_>>(),
        vec![&Comment {
            id: 6,
            text: Some("Hi&bye".to_string()),
            by: Some("a".to_string()),
            time: Utc.timestamp_opt(1_700_000_000, 0).single(),
            parent: Some(1),
        }]
    );
    assert_eq!(
        tables.stories.values().collect::<Vec<_>>(),
        vec![&Story {
            id: 7,
            title: Some("T".to_string()),
            by: Some("b".to_string()),
            descendants: None,
            score: None,
            time: Utc.timestamp_opt(1_700_000_100, 0).single(),
            url: None,
        }]
    );
    assert_eq!(tables.scrape.keys().copied().collect::<Vec<_>>(), vec![6, 7]);
    assert!(tables.skipped.is_empty());
    assert_eq!(store.max_watermark_id().await.unwrap(), Some(7));
}

#[tokio::test]
async fn test_every_id_gets_one_watermark_across_cycles() {
    let server = MockServer::start().await;
    mount_max_item(&server, 12).await;
    for id in 1..=12 {
        let body = match id % 4 {
            0 => Value::Null,
            1 => json!({"id": id, "type": "story", "title": format!("story {id}")}),
            2 => json!({"id": id, "type": "comment", "text": "x", "deleted": true}),
            _ => json!({"id": id, "by": "untyped"}),
        };
        mount_item(&server, id, body).await;
    }

    let store = Arc::new(MemoryItemStore::new());
    let mut pipeline = IngestionLoop::new(client_for(&server), store.clone(), &config(0, 5));
    let summary = pipeline.run().await.expect("Run failed");

    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.final_cursor, 12);

    let tables = store.snapshot().await;
    assert_eq!(tables.scrape.keys().copied().collect::<Vec<_>>(), (1..=12).collect::<Vec<_>>());
    assert_eq!(tables.stories.len(), 3);
    assert_eq!(tables.comments.len(), 3);
    assert_eq!(tables.deleted.len(), 3);
    // Null payloads and missing type tags.
    assert_eq!(tables.skipped.len(), 6);
}

#[tokio::test]
async fn test_upstream_failure_aborts_cycle_without_writes() {
    let server = MockServer::start().await;
    mount_max_item(&server, 3).await;
    mount_item(&server, 1, json!({"id": 1, "type": "story"})).await;
    mount_item(&server, 3, json!({"id": 3, "type": "story"})).await;
    Mock::given(method("GET"))
        .and(path("/v0/item/2.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryItemStore::new());
    let mut pipeline = IngestionLoop::new(client_for(&server), store.clone(), &config(0, 10));

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, IngestError::UpstreamUnavailable { .. }));
    assert_eq!(store.snapshot().await, MemoryTables::default());
}

#[tokio::test]
async fn test_max_item_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/maxitem.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryItemStore::new());
    let mut pipeline = IngestionLoop::new(client_for(&server), store.clone(), &config(0, 10));

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, IngestError::UpstreamUnavailable { .. }));
}

/// A commit that fails mid-run is retried by the next run over the same
/// range. Nothing is lost and, with ignore-on-conflict inserts, nothing is
/// duplicated.
#[tokio::test]
async fn test_replay_after_failed_commit_loses_and_duplicates_nothing() {
    let server = MockServer::start().await;
    mount_max_item(&server, 6).await;
    for id in 1..=6 {
        mount_item(&server, id, json!({"id": id, "type": "story", "title": "t"})).await;
    }

    let store = Arc::new(MemoryItemStore::new());

    // First cycle (1..=3) commits, the second fails.
    let mut first = IngestionLoop::new(client_for(&server), store.clone(), &config(0, 3));
    first.run_cycle().await.expect("First cycle failed");
    store.fail_next_commit();
    let err = first.run().await.unwrap_err();
    assert!(matches!(err, IngestError::StorageWriteFailure(_)));
    assert_eq!(store.max_watermark_id().await.unwrap(), Some(3));

    // The restart resumes at 4 and completes.
    let mut second = IngestionLoop::new(client_for(&server), store.clone(), &config(0, 3));
    let summary = second.run().await.expect("Replay failed");
    assert_eq!(summary.items_processed, 3);
    assert_eq!(summary.final_cursor, 6);

    let tables = store.snapshot().await;
    assert_eq!(tables.scrape.len(), 6);
    assert_eq!(tables.stories.keys().copied().collect::<Vec<_>>(), (1..=6).collect::<Vec<_>>());
}

/// Replaying a range that already committed (e.g. the process died after the
/// commit but before reporting) leaves the first rows in place.
#[tokio::test]
async fn test_recommitting_a_range_keeps_first_rows() {
    let server = MockServer::start().await;
    mount_max_item(&server, 2).await;
    mount_item(&server, 1, json!({"id": 1, "type": "story", "title": "first"})).await;
    mount_item(&server, 2, json!({"id": 2, "type": "job", "title": "hiring"})).await;

    let store = Arc::new(MemoryItemStore::new());
    IngestionLoop::new(client_for(&server), store.clone(), &config(0, 10))
        .run()
        .await
        .expect("Run failed");
    let before = store.snapshot().await;

    // Replaying from an older snapshot without the watermark for id 2.
    let mut rewound = before.clone();
    rewound.scrape.remove(&2);
    let replay_store = Arc::new(MemoryItemStore::with_tables(rewound));
    let mut replay = IngestionLoop::new(client_for(&server), replay_store.clone(), &config(0, 10));
    let summary = replay.run().await.expect("Replay failed");
    assert_eq!(summary.items_processed, 1);

    let after = replay_store.snapshot().await;
    assert_eq!(after.stories, before.stories);
    assert_eq!(after.jobs, before.jobs);
    assert_eq!(after.scrape.len(), 2);
}
