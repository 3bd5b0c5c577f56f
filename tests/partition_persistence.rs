//! Persistence behavior of the partition store across process restarts.
//!
//! Every test opens a store, drops it, and reopens the same directory the
//! way a restarted host would. Sibling unit tests in `src/partition/store.rs`
//! cover single-process semantics; these check what the rebuilt index looks
//! like after the original is gone.

use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use tempfile::TempDir;

use scorta::partition::EvictionSweeper;
use scorta::{PartitionStore, ProxyResponse};

fn response(body: &str) -> ProxyResponse {
    ProxyResponse::network(
        StatusCode::OK,
        vec![("content-type".to_string(), "text/plain".to_string())],
        Bytes::copy_from_slice(body.as_bytes()),
    )
}

async fn open(dir: &TempDir) -> PartitionStore {
    PartitionStore::open(dir.path())
        .await
        .expect("store should open")
}

/// Writes spaced out so rebuilt `stored_at` ordering cannot tie.
async fn put_spaced(store: &PartitionStore, partition: &str, keys: &[&str]) {
    for key in keys {
        store
            .put(partition, key, &response(key))
            .await
            .expect("put should succeed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn insertion_order_and_entries_survive_reopen_after_eviction() {
    let dir = TempDir::new().expect("tempdir");
    {
        let store = open(&dir).await;
        put_spaced(&store, "v1-image", &["a", "b", "c", "d"]).await;
        let sweeper = EvictionSweeper::new("v1-image", 2);
        let removed = sweeper.run(&store).await.expect("sweep should succeed");
        assert_eq!(removed, 2);
    }

    let reopened = open(&dir).await;
    assert_eq!(reopened.keys("v1-image"), vec!["c", "d"]);
    let survivor = reopened
        .get("v1-image", "c")
        .await
        .expect("get should succeed")
        .expect("entry should survive the restart");
    assert_eq!(survivor.body, Bytes::from_static(b"c"));
    assert!(reopened
        .get("v1-image", "a")
        .await
        .expect("get should succeed")
        .is_none());
}

#[tokio::test]
async fn rewriting_a_key_keeps_one_entry_at_the_back_across_restart() {
    let dir = TempDir::new().expect("tempdir");
    {
        let store = open(&dir).await;
        put_spaced(&store, "v1-dynamic", &["rewritten", "other"]).await;
        store
            .put("v1-dynamic", "rewritten", &response("second-body"))
            .await
            .expect("rewrite should succeed");
    }

    let reopened = open(&dir).await;
    assert_eq!(reopened.len("v1-dynamic"), 2);
    assert_eq!(reopened.keys("v1-dynamic"), vec!["other", "rewritten"]);
    let entry = reopened
        .get("v1-dynamic", "rewritten")
        .await
        .expect("get should succeed")
        .expect("entry should be present");
    assert_eq!(entry.body, Bytes::from_static(b"second-body"));
}

#[tokio::test]
async fn a_stray_temp_file_is_ignored_on_reopen() {
    let dir = TempDir::new().expect("tempdir");
    {
        let store = open(&dir).await;
        store
            .put("v1-static", "k", &response("kept"))
            .await
            .expect("put should succeed");
    }
    // A crash mid-write leaves an orphaned temp file behind.
    std::fs::write(
        dir.path().join("v1-static").join(".01234567.tmp"),
        b"partial",
    )
    .expect("write stray temp file");

    let reopened = open(&dir).await;
    assert_eq!(reopened.len("v1-static"), 1);
    assert!(reopened.contains("v1-static", "k"));
}

#[tokio::test]
async fn a_sidecar_without_a_body_is_skipped_on_reopen() {
    let dir = TempDir::new().expect("tempdir");
    {
        let store = open(&dir).await;
        store
            .put("v1-static", "k", &response("body"))
            .await
            .expect("put should succeed");
    }
    let partition_dir = dir.path().join("v1-static");
    let body_file = std::fs::read_dir(&partition_dir)
        .expect("read partition dir")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|path| path.extension().and_then(|ext| ext.to_str()) == Some("bin"))
        .expect("body file should exist");
    std::fs::remove_file(body_file).expect("remove body file");

    let reopened = open(&dir).await;
    assert_eq!(reopened.len("v1-static"), 0);
    assert!(reopened
        .get("v1-static", "k")
        .await
        .expect("get should succeed")
        .is_none());
}

#[tokio::test]
async fn removed_partitions_stay_gone_after_reopen() {
    let dir = TempDir::new().expect("tempdir");
    {
        let store = open(&dir).await;
        store
            .put("v0-static", "k", &response("old"))
            .await
            .expect("put should succeed");
        store
            .put("v1-static", "k", &response("new"))
            .await
            .expect("put should succeed");
        assert!(store
            .remove_partition("v0-static")
            .await
            .expect("remove should succeed"));
    }

    let reopened = open(&dir).await;
    assert_eq!(reopened.partition_names(), vec!["v1-static".to_string()]);
    assert!(reopened.contains("v1-static", "k"));
}
