mod common;

use common::{signed_in, uid, RecordingStore};
use serde_json::json;
use sharememo_core::model::relationship::Relationship;
use sharememo_core::store::MEMOS;
use sharememo_core::{CoreError, DocumentStore, MemoResolver, SessionIdentityProvider};
use std::sync::Arc;

fn resolver(store: &Arc<RecordingStore>, me: &str) -> MemoResolver {
    let store: Arc<dyn DocumentStore> = store.clone();
    MemoResolver::new(store, signed_in(me))
}

async fn put_memo(store: &RecordingStore, id: &str, members: [&str; 2], latest: &str) {
    store
        .put(
            MEMOS,
            id,
            json!({
                "name": id,
                "members": members,
                "content": "",
                "latestUpdate": latest,
            }),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn pair_can_create_only_one_memo_in_either_order() {
    let store = RecordingStore::new();
    let memos = resolver(&store, "alice");
    let alice = uid("alice");
    let bob = uid("bob");

    let created = memos
        .create_shared_document_if_absent(&alice, &bob, "groceries")
        .await
        .unwrap();
    assert_eq!(created.content, "");
    assert_eq!(created.members, [alice.clone(), bob.clone()]);

    let err = memos
        .create_shared_document_if_absent(&bob, &alice, "again")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyExists(_)));

    let forward = memos.find_shared_document(&alice, &bob).await.unwrap().unwrap();
    let backward = memos.find_shared_document(&bob, &alice).await.unwrap().unwrap();
    assert_eq!(forward.id, created.id);
    assert_eq!(backward.id, created.id);
    assert_eq!(store.writes_to(MEMOS).len(), 1);
}

#[tokio::test]
async fn overlapping_pairs_are_not_confused() {
    let store = RecordingStore::new();
    let memos = resolver(&store, "alice");
    memos
        .create_shared_document_if_absent(&uid("alice"), &uid("carol"), "trip")
        .await
        .unwrap();
    memos
        .create_shared_document_if_absent(&uid("bob"), &uid("carol"), "chores")
        .await
        .unwrap();

    assert!(memos
        .find_shared_document(&uid("alice"), &uid("bob"))
        .await
        .unwrap()
        .is_none());
    memos
        .ensure_no_shared_document(&uid("alice"), &uid("bob"))
        .await
        .unwrap();
    let err = memos
        .ensure_no_shared_document(&uid("carol"), &uid("alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyExists(_)));
}

#[tokio::test]
async fn create_rejects_self_pair_and_bad_titles_before_writing() {
    let store = RecordingStore::new();
    let memos = resolver(&store, "alice");

    let err = memos
        .create_shared_document_if_absent(&uid("alice"), &uid("alice"), "solo")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SelfReferenceNotAllowed));

    let err = memos
        .create_shared_document_if_absent(&uid("alice"), &uid("bob"), "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationFailed(_)));

    let err = memos
        .create_shared_document_if_absent(&uid("alice"), &uid("bob"), "a title far too long")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationFailed(_)));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn duplicate_pair_memos_resolve_to_earliest() {
    let store = RecordingStore::new();
    put_memo(&store, "m-late", ["alice", "bob"], "2024-05-02T09:00:00Z").await;
    put_memo(&store, "m-early", ["bob", "alice"], "2024-05-01T09:00:00Z").await;
    put_memo(&store, "m-tie-b", ["carol", "dave"], "2024-05-01T09:00:00Z").await;
    put_memo(&store, "m-tie-a", ["dave", "carol"], "2024-05-01T09:00:00Z").await;
    let memos = resolver(&store, "alice");

    let found = memos
        .find_shared_document(&uid("bob"), &uid("alice"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, "m-early");

    let found = memos
        .find_shared_document(&uid("carol"), &uid("dave"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, "m-tie-a");
}

#[tokio::test]
async fn latest_documents_are_newest_first_and_rename_keeps_content() {
    let store = RecordingStore::new();
    put_memo(&store, "older", ["alice", "bob"], "2024-05-01T09:00:00Z").await;
    put_memo(&store, "newer", ["carol", "alice"], "2024-05-03T09:00:00Z").await;
    put_memo(&store, "other", ["carol", "bob"], "2024-05-04T09:00:00Z").await;
    store
        .update(MEMOS, "older", json!({ "content": "milk" }))
        .await
        .unwrap();
    let memos = resolver(&store, "alice");

    let listed = memos.latest_documents_for(&uid("alice")).await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|memo| memo.id.as_str()).collect();
    assert_eq!(ids, ["newer", "older"]);

    memos
        .rename_shared_document(&"older".to_string(), "shopping")
        .await
        .unwrap();
    let renamed = memos.get_shared_document("older").await.unwrap();
    assert_eq!(renamed.title, "shopping");
    assert_eq!(renamed.content, "milk");

    let err = memos
        .rename_shared_document(&"missing".to_string(), "x")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn friends_without_memo_excludes_paired_peers() {
    let store = RecordingStore::new();
    put_memo(&store, "ab", ["alice", "bob"], "2024-05-01T09:00:00Z").await;
    let memos = resolver(&store, "alice");
    let friends = vec![
        Relationship::new(uid("bob")),
        Relationship::new(uid("carol")),
    ];

    let open = memos
        .friends_without_memo(&uid("alice"), &friends)
        .await
        .unwrap();
    assert_eq!(open, vec![Relationship::new(uid("carol"))]);
}

#[tokio::test]
async fn lookups_require_a_signed_in_identity() {
    let store = RecordingStore::new();
    let dyn_store: Arc<dyn DocumentStore> = store.clone();
    let memos = MemoResolver::new(dyn_store, Arc::new(SessionIdentityProvider::new()));

    let err = memos
        .find_shared_document(&uid("alice"), &uid("bob"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotAuthenticated));
}
