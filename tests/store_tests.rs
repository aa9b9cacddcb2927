use std::sync::Arc;

use chrono::{Duration, Utc};
use flakescope::assemble;
use flakescope::failure::TestFailure;
use flakescope::store::{build_store, DataStore, JsonFileStore, MemoryStore, StoreKind};

fn failure(id: &str, days_ago: i64) -> TestFailure {
    TestFailure {
        id: id.to_string(),
        test_title: "Login button should be visible".to_string(),
        test_file_path: "tests/auth/login.spec.ts".to_string(),
        error_message: "Error: expect(locator).toBeVisible() failed".to_string(),
        error_stack: None,
        timestamp: Utc::now() - Duration::days(days_ago),
        metadata: None,
    }
}

fn sample_clusters() -> Vec<assemble::FailureCluster> {
    let failures = vec![failure("f-1", 1), failure("f-2", 2)];
    assemble::assemble_clusters(&failures, &[vec![0, 1]], "2024-05-01", 1)
}

#[tokio::test]
async fn memory_store_filters_failures_by_time_window() {
    let store = MemoryStore::new();
    store
        .seed_failures(vec![failure("recent", 1), failure("stale", 10)])
        .await;
    let fetched = store.fetch_failures(7).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].id, "recent");
}

#[tokio::test]
async fn memory_store_replaces_clusters_on_save() {
    let store = MemoryStore::new();
    let clusters = sample_clusters();
    store.save_clusters(&clusters).await.unwrap();
    store.save_clusters(&clusters).await.unwrap();
    let fetched = store.fetch_clusters(None).await.unwrap();
    assert_eq!(fetched.len(), clusters.len());
}

#[tokio::test]
async fn memory_store_honors_fetch_limit() {
    let store = MemoryStore::new();
    let failures = vec![
        failure("f-1", 1),
        failure("f-2", 1),
        failure("f-3", 1),
        failure("f-4", 1),
    ];
    let clusters =
        assemble::assemble_clusters(&failures, &[vec![0, 1], vec![2, 3]], "2024-05-01", 1);
    store.save_clusters(&clusters).await.unwrap();
    assert_eq!(store.fetch_clusters(Some(1)).await.unwrap().len(), 1);
    assert_eq!(store.fetch_clusters(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn file_store_round_trips_failures_and_clusters() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());

    let failures = vec![failure("f-1", 1), failure("f-2", 2)];
    store.save_failures(&failures).await.unwrap();
    let fetched = store.fetch_failures(7).await.unwrap();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0].id, "f-1");

    let clusters = sample_clusters();
    store.save_clusters(&clusters).await.unwrap();
    let fetched = store.fetch_clusters(None).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].id, clusters[0].id);
    assert_eq!(fetched[0].metadata.failure_count, 2);
}

#[tokio::test]
async fn file_store_reads_missing_documents_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    assert!(store.fetch_failures(7).await.unwrap().is_empty());
    assert!(store.fetch_clusters(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn file_store_save_replaces_the_previous_pass() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());

    store.save_clusters(&sample_clusters()).await.unwrap();
    let failures = vec![failure("g-1", 1), failure("g-2", 1)];
    let replacement =
        assemble::assemble_clusters(&failures, &[vec![0, 1]], "2024-05-02", 1);
    store.save_clusters(&replacement).await.unwrap();

    let fetched = store.fetch_clusters(None).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].id, "2024-05-02-0");
}

#[tokio::test]
async fn file_store_rejects_corrupt_documents() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("flaky_clusters.json"), "not json").unwrap();
    let store = JsonFileStore::new(dir.path());
    let err = store.fetch_clusters(None).await.unwrap_err();
    assert!(matches!(err, flakescope::error::DetectError::Storage(_)));
}

#[test]
fn store_kind_parses_and_builds() {
    assert_eq!("memory".parse::<StoreKind>().unwrap(), StoreKind::Memory);
    assert_eq!("file".parse::<StoreKind>().unwrap(), StoreKind::File);
    assert!("cloud".parse::<StoreKind>().is_err());

    let dir = tempfile::tempdir().unwrap();
    let _store: Arc<dyn DataStore> = build_store(StoreKind::File, dir.path());
    let _store: Arc<dyn DataStore> = build_store(StoreKind::Memory, dir.path());
}

#[tokio::test]
async fn persisted_clusters_keep_optional_fields_optional() {
    // older persisted records may omit the newer metadata fields
    let raw = r#"[{
        "id": "2024-01-01-0",
        "failures": [],
        "metadata": {
            "failureCount": 2,
            "firstSeen": "2024-01-01T00:00:00Z",
            "lastSeen": "2024-01-01T02:00:00Z"
        }
    }]"#;
    let parsed: Vec<assemble::FailureCluster> = serde_json::from_str(raw).unwrap();
    assert_eq!(parsed[0].metadata.failure_count, 2);
    assert!(parsed[0].metadata.run_ids.is_empty());
    assert!(parsed[0].metadata.failure_ids.is_empty());
    assert!(parsed[0].failure_pattern.is_empty());
    assert_eq!(parsed[0].assertion_pattern, None);
}
