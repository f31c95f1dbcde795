//! SQLite-backed document store with in-process change notifications.
//!
//! # Responsibility
//! - Persist documents as JSON text keyed by `(collection, id)`.
//! - Fan out every committed write to live subscriptions.
//! - Keep blob bytes alongside documents and resolve download urls.
//!
//! # Invariants
//! - A change event is broadcast only after the write has committed.
//! - Subscribers register on the change channel before reading the initial
//!   snapshot, so no committed write can fall between the two.
//! - A lagging subscriber re-reads the document instead of skipping state.

use super::{
    Document, DocumentStore, Filter, OrderBy, SnapshotCallback, StoreError, StoreResult,
    SubscriptionHandle,
};
use crate::db::{open_db, open_db_in_memory};
use async_trait::async_trait;
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

const CHANGE_CHANNEL_CAPACITY: usize = 256;
const BLOB_URL_SCHEME: &str = "blob://";

#[derive(Debug, Clone)]
struct DocumentChange {
    collection: String,
    id: String,
}

/// Local document store over one SQLite connection.
///
/// Cloning is cheap; clones share the connection and change channel.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<DocumentChange>,
}

impl SqliteDocumentStore {
    /// Wraps a migrated connection.
    pub fn new(conn: Connection) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
        }
    }

    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Reads blob bytes back from a url returned by `upload_blob`.
    pub fn read_blob(&self, url: &str) -> StoreResult<Vec<u8>> {
        let (directory, name) = parse_blob_url(url)
            .ok_or_else(|| StoreError::DownloadUrlUnavailable(url.to_string()))?;
        let conn = self.lock()?;
        conn.query_row(
            "SELECT bytes FROM blobs WHERE directory = ?1 AND name = ?2;",
            params![directory, name],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::DownloadUrlUnavailable(url.to_string()))
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("sqlite connection lock poisoned".to_string()))
    }

    fn read_document(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT fields FROM documents WHERE collection = ?1 AND id = ?2;",
                params![collection, id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        match raw {
            Some(text) => Ok(Some(Document {
                collection: collection.to_string(),
                id: id.to_string(),
                fields: serde_json::from_str(&text)?,
            })),
            None => Ok(None),
        }
    }

    fn notify(&self, collection: &str, id: &str) {
        // No receivers is the normal state when nothing is subscribed.
        let _ = self.changes.send(DocumentChange {
            collection: collection.to_string(),
            id: id.to_string(),
        });
    }

    fn snapshot(&self, collection: &str, id: &str) -> StoreResult<Document> {
        self.read_document(collection, id)?
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.read_document(collection, id)
    }

    async fn put(&self, collection: &str, id: &str, fields: Value) -> StoreResult<()> {
        ensure_object(&fields)?;
        let text = serde_json::to_string(&fields)?;
        {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO documents (collection, id, fields)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (collection, id) DO UPDATE SET
                    fields = excluded.fields,
                    updated_at = (strftime('%s', 'now') * 1000);",
                params![collection, id, text],
            )?;
        }
        debug!("event=store_put module=store status=ok collection={collection} id={id}");
        self.notify(collection, id);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, partial: Value) -> StoreResult<()> {
        let partial = match partial {
            Value::Object(map) => map,
            other => return Err(StoreError::InvalidFields(other.to_string())),
        };
        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let existing = tx
                .query_row(
                    "SELECT fields FROM documents WHERE collection = ?1 AND id = ?2;",
                    params![collection, id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;

            let mut merged: Value = serde_json::from_str(&existing)?;
            let Some(target) = merged.as_object_mut() else {
                return Err(StoreError::InvalidFields(existing));
            };
            target.extend(partial);

            tx.execute(
                "UPDATE documents
                 SET
                    fields = ?3,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE collection = ?1 AND id = ?2;",
                params![collection, id, serde_json::to_string(&merged)?],
            )?;
            tx.commit()?;
        }
        debug!("event=store_update module=store status=ok collection={collection} id={id}");
        self.notify(collection, id);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        order_by: Option<&OrderBy>,
    ) -> StoreResult<Vec<Document>> {
        let rows = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(
                "SELECT id, fields FROM documents WHERE collection = ?1 ORDER BY id ASC;",
            )?;
            let rows = stmt
                .query_map(params![collection], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut documents = Vec::with_capacity(rows.len());
        for (id, text) in rows {
            let fields: Value = serde_json::from_str(&text)?;
            if filter.map_or(true, |filter| filter.matches(&fields)) {
                documents.push(Document {
                    collection: collection.to_string(),
                    id,
                    fields,
                });
            }
        }
        if let Some(order) = order_by {
            // Stable sort keeps id order among equal keys.
            documents.sort_by(|left, right| order.compare(left, right));
        }

        debug!(
            "event=store_query module=store status=ok collection={collection} hits={}",
            documents.len()
        );
        Ok(documents)
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let changed = {
            let conn = self.lock()?;
            conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2;",
                params![collection, id],
            )?
        };
        if changed > 0 {
            self.notify(collection, id);
        }
        debug!(
            "event=store_delete module=store status=ok collection={collection} id={id} changed={changed}"
        );
        Ok(())
    }

    async fn subscribe(
        &self,
        collection: &str,
        id: &str,
        on_change: SnapshotCallback,
    ) -> StoreResult<SubscriptionHandle> {
        let mut receiver = self.changes.subscribe();
        on_change(self.snapshot(collection, id));

        let store = self.clone();
        let target_collection = collection.to_string();
        let target_id = id.to_string();
        let listener = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(change)
                        if change.collection == target_collection && change.id == target_id =>
                    {
                        on_change(store.snapshot(&target_collection, &target_id));
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            "event=subscription_lagged module=store status=recovering collection={target_collection} id={target_id} skipped={skipped}"
                        );
                        on_change(store.snapshot(&target_collection, &target_id));
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        debug!("event=subscription_open module=store status=ok collection={collection} id={id}");
        Ok(SubscriptionHandle::new(
            collection.to_string(),
            id.to_string(),
            listener,
        ))
    }

    async fn upload_blob(&self, directory: &str, bytes: Vec<u8>) -> StoreResult<String> {
        let name = Uuid::new_v4().to_string();
        let size = i64::try_from(bytes.len())
            .map_err(|_| StoreError::Backend("blob too large".to_string()))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO blobs (directory, name, bytes, size) VALUES (?1, ?2, ?3, ?4);",
            params![directory, name, bytes, size],
        )?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT name FROM blobs WHERE directory = ?1 AND name = ?2;",
                params![directory, name],
                |row| row.get(0),
            )
            .optional()?;
        let stored = stored.ok_or_else(|| StoreError::DownloadUrlUnavailable(name.clone()))?;

        debug!("event=blob_upload module=store status=ok directory={directory} size={size}");
        Ok(format!("{BLOB_URL_SCHEME}{directory}/{stored}"))
    }
}

fn ensure_object(fields: &Value) -> StoreResult<()> {
    if fields.is_object() {
        Ok(())
    } else {
        Err(StoreError::InvalidFields(fields.to_string()))
    }
}

fn parse_blob_url(url: &str) -> Option<(&str, &str)> {
    url.strip_prefix(BLOB_URL_SCHEME)?.rsplit_once('/')
}

#[cfg(test)]
mod tests {
    use super::parse_blob_url;

    #[test]
    fn blob_url_splits_directory_and_name() {
        assert_eq!(
            parse_blob_url("blob://profile_image/abc"),
            Some(("profile_image", "abc"))
        );
        assert_eq!(parse_blob_url("https://example.com/x"), None);
    }
}
