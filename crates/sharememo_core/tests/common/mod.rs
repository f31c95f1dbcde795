#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use sharememo_core::store::{
    Document, DocumentStore, Filter, OrderBy, SnapshotCallback, SqliteDocumentStore, StoreError,
    StoreResult, SubscriptionHandle,
};
use sharememo_core::{Identity, Profile, ProfileService, SessionIdentityProvider};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Put,
    Update,
}

#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub kind: WriteKind,
    pub collection: String,
    pub id: String,
    pub fields: Value,
    pub at: Instant,
}

/// SQLite store wrapper that records calls and injects failures.
pub struct RecordingStore {
    inner: SqliteDocumentStore,
    writes: Mutex<Vec<WriteRecord>>,
    gets: Mutex<Vec<String>>,
    failing_collections: Mutex<HashSet<String>>,
    failing_gets: Mutex<HashSet<String>>,
    hanging_gets: Mutex<HashSet<String>>,
    update_delay: Mutex<Option<Duration>>,
    failing_updates: Mutex<usize>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteDocumentStore::open_in_memory().unwrap(),
            writes: Mutex::new(Vec::new()),
            gets: Mutex::new(Vec::new()),
            failing_collections: Mutex::new(HashSet::new()),
            failing_gets: Mutex::new(HashSet::new()),
            hanging_gets: Mutex::new(HashSet::new()),
            update_delay: Mutex::new(None),
            failing_updates: Mutex::new(0),
        })
    }

    pub fn inner(&self) -> &SqliteDocumentStore {
        &self.inner
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().unwrap().clone()
    }

    pub fn writes_to(&self, collection: &str) -> Vec<WriteRecord> {
        self.writes()
            .into_iter()
            .filter(|write| write.collection == collection)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    pub fn get_count(&self) -> usize {
        self.gets.lock().unwrap().len()
    }

    pub fn fail_writes_to(&self, collection: &str) {
        self.failing_collections
            .lock()
            .unwrap()
            .insert(collection.to_string());
    }

    pub fn heal(&self) {
        self.failing_collections.lock().unwrap().clear();
        self.failing_gets.lock().unwrap().clear();
        self.hanging_gets.lock().unwrap().clear();
        *self.failing_updates.lock().unwrap() = 0;
    }

    pub fn fail_get(&self, id: &str) {
        self.failing_gets.lock().unwrap().insert(id.to_string());
    }

    pub fn hang_get(&self, id: &str) {
        self.hanging_gets.lock().unwrap().insert(id.to_string());
    }

    /// Every later `update` waits this long before it lands or fails.
    pub fn delay_updates(&self, delay: Duration) {
        *self.update_delay.lock().unwrap() = Some(delay);
    }

    /// The next `count` calls to `update` fail with a backend error.
    pub fn fail_next_updates(&self, count: usize) {
        *self.failing_updates.lock().unwrap() = count;
    }

    fn record(&self, kind: WriteKind, collection: &str, id: &str, fields: &Value) -> StoreResult<()> {
        if self.failing_collections.lock().unwrap().contains(collection) {
            return Err(StoreError::Backend(format!("injected failure on {collection}")));
        }
        self.writes.lock().unwrap().push(WriteRecord {
            kind,
            collection: collection.to_string(),
            id: id.to_string(),
            fields: fields.clone(),
            at: Instant::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.gets.lock().unwrap().push(format!("{collection}/{id}"));
        let hangs = self.hanging_gets.lock().unwrap().contains(id);
        if hangs {
            futures::future::pending::<()>().await;
        }
        let fails = self.failing_gets.lock().unwrap().contains(id);
        if fails {
            return Err(StoreError::Backend(format!("injected read failure on {id}")));
        }
        self.inner.get(collection, id).await
    }

    async fn put(&self, collection: &str, id: &str, fields: Value) -> StoreResult<()> {
        self.record(WriteKind::Put, collection, id, &fields)?;
        self.inner.put(collection, id, fields).await
    }

    async fn update(&self, collection: &str, id: &str, partial: Value) -> StoreResult<()> {
        let delay = *self.update_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let fails = {
            let mut remaining = self.failing_updates.lock().unwrap();
            let fails = *remaining > 0;
            *remaining = remaining.saturating_sub(1);
            fails
        };
        if fails {
            return Err(StoreError::Backend(format!("injected update failure on {id}")));
        }
        self.record(WriteKind::Update, collection, id, &partial)?;
        self.inner.update(collection, id, partial).await
    }

    async fn query(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        order_by: Option<&OrderBy>,
    ) -> StoreResult<Vec<Document>> {
        self.inner.query(collection, filter, order_by).await
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.inner.delete(collection, id).await
    }

    async fn subscribe(
        &self,
        collection: &str,
        id: &str,
        on_change: SnapshotCallback,
    ) -> StoreResult<SubscriptionHandle> {
        self.inner.subscribe(collection, id, on_change).await
    }

    async fn upload_blob(&self, directory: &str, bytes: Vec<u8>) -> StoreResult<String> {
        self.inner.upload_blob(directory, bytes).await
    }
}

pub fn uid(value: &str) -> Identity {
    Identity::new(value).unwrap()
}

pub fn signed_in(value: &str) -> Arc<SessionIdentityProvider> {
    Arc::new(SessionIdentityProvider::signed_in(uid(value)))
}

pub async fn seed_profile(store: Arc<dyn DocumentStore>, value: &str, name: &str) -> Profile {
    let mut profile = Profile::new(uid(value), format!("{value}@example.com"));
    profile.display_name = name.to_string();
    ProfileService::new(store).save_profile(&profile).await.unwrap();
    profile
}
