use serde_json::json;
use sharememo_core::store::{
    Document, DocumentStore, Filter, OrderBy, SnapshotCallback, SqliteDocumentStore, StoreError,
    StoreResult, MEMOS, PROFILE_IMAGES,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Seen = Arc<Mutex<Vec<StoreResult<Document>>>>;

fn recorder() -> (Seen, SnapshotCallback) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: SnapshotCallback = Arc::new(move |snapshot| sink.lock().unwrap().push(snapshot));
    (seen, callback)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn update_merges_fields_and_requires_existing_document() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    store
        .put(MEMOS, "m1", json!({ "name": "list", "content": "eggs" }))
        .await
        .unwrap();

    store
        .update(MEMOS, "m1", json!({ "content": "eggs, milk" }))
        .await
        .unwrap();
    let stored = store.get(MEMOS, "m1").await.unwrap().unwrap();
    assert_eq!(stored.fields, json!({ "name": "list", "content": "eggs, milk" }));

    let err = store
        .update(MEMOS, "missing", json!({ "content": "x" }))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));

    let err = store.put(MEMOS, "m2", json!(["not", "an", "object"])).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidFields(_)));
}

#[tokio::test]
async fn query_filters_membership_and_orders_by_field() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    store
        .put(MEMOS, "a", json!({ "members": ["x", "y"], "latestUpdate": "2024-05-01T00:00:00Z" }))
        .await
        .unwrap();
    store
        .put(MEMOS, "b", json!({ "members": ["y", "z"], "latestUpdate": "2024-05-03T00:00:00Z" }))
        .await
        .unwrap();
    store
        .put(MEMOS, "c", json!({ "members": ["z", "w"], "latestUpdate": "2024-05-02T00:00:00Z" }))
        .await
        .unwrap();

    let filter = Filter::array_contains_any("members", [json!("x"), json!("z")]);
    let order = OrderBy::descending("latestUpdate");
    let found = store.query(MEMOS, Some(&filter), Some(&order)).await.unwrap();
    let ids: Vec<&str> = found.iter().map(|doc| doc.id.as_str()).collect();
    assert_eq!(ids, ["b", "c", "a"]);

    let filter = Filter::array_contains("members", "y");
    let found = store.query(MEMOS, Some(&filter), None).await.unwrap();
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn subscription_delivers_initial_snapshot_then_changes() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    store.put(MEMOS, "m1", json!({ "content": "v1" })).await.unwrap();
    store.put(MEMOS, "other", json!({ "content": "o" })).await.unwrap();
    let (seen, callback) = recorder();

    let handle = store.subscribe(MEMOS, "m1", callback).await.unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert!(handle.is_active());
    assert_eq!(handle.target(), (MEMOS, "m1"));

    store.update(MEMOS, "m1", json!({ "content": "v2" })).await.unwrap();
    store.update(MEMOS, "other", json!({ "content": "o2" })).await.unwrap();
    store.delete(MEMOS, "m1").await.unwrap();
    settle().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[1].as_ref().unwrap().fields["content"], "v2");
    assert!(matches!(seen[2], Err(StoreError::NotFound { .. })));
}

#[tokio::test]
async fn released_subscription_stops_callbacks() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    store.put(MEMOS, "m1", json!({ "content": "v1" })).await.unwrap();
    let (seen, callback) = recorder();

    let handle = store.subscribe(MEMOS, "m1", callback).await.unwrap();
    store.unsubscribe(handle);
    store.update(MEMOS, "m1", json!({ "content": "v2" })).await.unwrap();
    settle().await;

    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn uploaded_blob_is_readable_through_its_url() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();

    let url = store
        .upload_blob(PROFILE_IMAGES, vec![1, 2, 3])
        .await
        .unwrap();

    assert!(url.starts_with("blob://profile_image/"));
    assert_eq!(store.read_blob(&url).unwrap(), vec![1, 2, 3]);
    let err = store.read_blob("blob://profile_image/nope").unwrap_err();
    assert!(matches!(err, StoreError::DownloadUrlUnavailable(_)));
}

#[tokio::test]
async fn file_backed_store_keeps_documents_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sharememo.db");

    let store = SqliteDocumentStore::open(&path).unwrap();
    store.put(MEMOS, "m1", json!({ "content": "durable" })).await.unwrap();
    drop(store);

    let reopened = SqliteDocumentStore::open(&path).unwrap();
    let stored = reopened.get(MEMOS, "m1").await.unwrap().unwrap();
    assert_eq!(stored.fields["content"], "durable");
}
