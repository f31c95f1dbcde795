mod common;

use common::{seed_profile, uid, RecordingStore};
use serde_json::json;
use sharememo_core::store::USERS;
use sharememo_core::{CoreError, DocumentStore, Profile, ProfileService};
use std::sync::Arc;

fn profiles(store: &Arc<RecordingStore>) -> ProfileService {
    let store: Arc<dyn DocumentStore> = store.clone();
    ProfileService::new(store)
}

#[tokio::test]
async fn saved_profile_uses_wire_field_names() {
    let store = RecordingStore::new();
    let saved = seed_profile(store.clone(), "alice", "Alice").await;

    let raw = store.get(USERS, "alice").await.unwrap().unwrap();
    assert_eq!(raw.fields["username"], "Alice");
    assert_eq!(raw.fields["email"], "alice@example.com");
    assert!(raw.fields.get("createdAt").is_some());
    assert!(raw.fields.get("identity").is_none());

    let loaded = profiles(&store).get_profile(&uid("alice")).await.unwrap();
    assert_eq!(loaded, saved);
}

#[tokio::test]
async fn over_long_display_name_is_rejected() {
    let store = RecordingStore::new();
    let mut profile = Profile::new(uid("alice"), "alice@example.com");
    profile.display_name = "Alexandria".to_string();

    let err = profiles(&store).save_profile(&profile).await.unwrap_err();

    assert!(matches!(err, CoreError::ValidationFailed(_)));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn malformed_profile_fields_surface_as_validation_failure() {
    let store = RecordingStore::new();
    store
        .put(USERS, "alice", json!({ "email": 42 }))
        .await
        .unwrap();

    let err = profiles(&store).get_profile(&uid("alice")).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationFailed(_)));
}

#[tokio::test]
async fn replacing_image_uploads_and_links_url() {
    let store = RecordingStore::new();
    seed_profile(store.clone(), "alice", "Alice").await;
    let service = profiles(&store);

    let url = service
        .replace_profile_image(&uid("alice"), vec![0xFF, 0xD8])
        .await
        .unwrap();

    let loaded = service.get_profile(&uid("alice")).await.unwrap();
    assert_eq!(loaded.profile_image_url, url);
    assert_eq!(store.inner().read_blob(&url).unwrap(), vec![0xFF, 0xD8]);

    let err = service
        .upload_profile_image(Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationFailed(_)));
}

#[tokio::test]
async fn image_update_for_unknown_profile_is_not_found() {
    let store = RecordingStore::new();

    let err = profiles(&store)
        .update_profile_image(&uid("ghost"), "blob://profile_image/x")
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn deleted_profile_is_gone() {
    let store = RecordingStore::new();
    seed_profile(store.clone(), "alice", "Alice").await;
    let service = profiles(&store);

    service.delete_profile(&uid("alice")).await.unwrap();

    let err = service.get_profile(&uid("alice")).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}
