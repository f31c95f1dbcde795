//! Document store contract consumed by core services.
//!
//! # Responsibility
//! - Define the narrow get/put/update/query/subscribe/blob surface the core
//!   relies on, independent of the concrete backend.
//! - Provide filter and ordering primitives evaluated over JSON fields.
//!
//! # Invariants
//! - Document fields are always JSON objects.
//! - A subscription delivers the current snapshot first, then every change,
//!   until its handle is released.
//! - Releasing a `SubscriptionHandle` (explicitly or by drop) stops all
//!   further callbacks.

use crate::db::DbError;
use crate::model::identity::Identity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

mod sqlite;

pub use sqlite::SqliteDocumentStore;

pub const USERS: &str = "users";
pub const MEMOS: &str = "memos";
pub const FRIENDS: &str = "friends";
pub const PROFILE_IMAGES: &str = "profile_image";

pub mod fields {
    pub const MEMBERS: &str = "members";
    pub const LATEST_UPDATE: &str = "latestUpdate";
    pub const PROFILE_IMAGE_URL: &str = "profileImageUrl";
    pub const NAME: &str = "name";
}

/// Collection path holding the friend edges owned by `owner`.
pub fn friends_collection(owner: &Identity) -> String {
    format!("{USERS}/{owner}/{FRIENDS}")
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
    #[error("document fields must be a JSON object: {0}")]
    InvalidFields(String),
    #[error("download url unavailable for blob `{0}`")]
    DownloadUrlUnavailable(String),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Db(#[from] DbError),
    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One stored document and its key.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub collection: String,
    pub id: String,
    pub fields: Value,
}

/// Query predicate evaluated against document fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the value.
    Equals { field: String, value: Value },
    /// Array field contains the value.
    ArrayContains { field: String, value: Value },
    /// Array field contains at least one of the values.
    ArrayContainsAny { field: String, values: Vec<Value> },
}

impl Filter {
    pub fn array_contains(field: &str, value: impl Into<Value>) -> Self {
        Self::ArrayContains {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn array_contains_any(field: &str, values: impl IntoIterator<Item = Value>) -> Self {
        Self::ArrayContainsAny {
            field: field.to_string(),
            values: values.into_iter().collect(),
        }
    }

    pub fn matches(&self, fields: &Value) -> bool {
        match self {
            Self::Equals { field, value } => fields.get(field) == Some(value),
            Self::ArrayContains { field, value } => fields
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Self::ArrayContainsAny { field, values } => fields
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| values.iter().any(|value| items.contains(value))),
        }
    }
}

/// Result ordering on a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn descending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: true,
        }
    }

    pub fn ascending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: false,
        }
    }

    pub fn compare(&self, left: &Document, right: &Document) -> Ordering {
        let ordering = compare_values(left.fields.get(&self.field), right.fields.get(&self.field));
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Orders field values; RFC 3339 strings compare as instants.
fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(l)), Some(Value::Number(r))) => l
            .as_f64()
            .partial_cmp(&r.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(l)), Some(Value::String(r))) => {
            match (
                DateTime::parse_from_rfc3339(l),
                DateTime::parse_from_rfc3339(r),
            ) {
                (Ok(l), Ok(r)) => l.with_timezone(&Utc).cmp(&r.with_timezone(&Utc)),
                _ => l.cmp(r),
            }
        }
        (Some(l), Some(r)) => l.to_string().cmp(&r.to_string()),
    }
}

/// Snapshot callback; deleted documents arrive as `StoreError::NotFound`.
pub type SnapshotCallback = Arc<dyn Fn(StoreResult<Document>) + Send + Sync>;

/// Live subscription registration.
///
/// Dropping the handle releases the listener as well.
#[derive(Debug)]
pub struct SubscriptionHandle {
    collection: String,
    id: String,
    listener: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub(crate) fn new(collection: String, id: String, listener: JoinHandle<()>) -> Self {
        Self {
            collection,
            id,
            listener: Some(listener),
        }
    }

    pub fn target(&self) -> (&str, &str) {
        (&self.collection, &self.id)
    }

    pub fn is_active(&self) -> bool {
        self.listener
            .as_ref()
            .is_some_and(|listener| !listener.is_finished())
    }

    /// Stops callback delivery. Idempotent.
    pub fn release(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            log::debug!(
                "event=subscription_release module=store status=ok collection={} id={}",
                self.collection,
                self.id
            );
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Networked document database contract.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Writes the full field set, creating or overwriting the document.
    async fn put(&self, collection: &str, id: &str, fields: Value) -> StoreResult<()>;

    /// Merges top-level fields into an existing document.
    async fn update(&self, collection: &str, id: &str, partial: Value) -> StoreResult<()>;

    async fn query(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        order_by: Option<&OrderBy>,
    ) -> StoreResult<Vec<Document>>;

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    async fn subscribe(
        &self,
        collection: &str,
        id: &str,
        on_change: SnapshotCallback,
    ) -> StoreResult<SubscriptionHandle>;

    fn unsubscribe(&self, mut handle: SubscriptionHandle) {
        handle.release();
    }

    /// Stores bytes under `directory` and returns their download url.
    async fn upload_blob(&self, directory: &str, bytes: Vec<u8>) -> StoreResult<String>;
}

#[cfg(test)]
mod tests {
    use super::{Document, Filter, OrderBy};
    use serde_json::json;
    use std::cmp::Ordering;

    fn doc(id: &str, fields: serde_json::Value) -> Document {
        Document {
            collection: "memos".to_string(),
            id: id.to_string(),
            fields,
        }
    }

    #[test]
    fn array_filters_match_membership() {
        let fields = json!({ "members": ["a", "b"] });
        assert!(Filter::array_contains("members", "a").matches(&fields));
        assert!(!Filter::array_contains("members", "c").matches(&fields));
        assert!(Filter::array_contains_any("members", [json!("c"), json!("b")]).matches(&fields));
        assert!(!Filter::array_contains_any("members", [json!("c")]).matches(&fields));
        assert!(!Filter::array_contains("missing", "a").matches(&fields));
    }

    #[test]
    fn order_by_compares_timestamps_as_instants() {
        // Fractional seconds would sort wrongly as plain strings.
        let early = doc("x", json!({ "latestUpdate": "2024-05-01T10:00:00Z" }));
        let late = doc("y", json!({ "latestUpdate": "2024-05-01T10:00:00.500Z" }));
        let order = OrderBy::ascending("latestUpdate");
        assert_eq!(order.compare(&early, &late), Ordering::Less);
        assert_eq!(
            OrderBy::descending("latestUpdate").compare(&early, &late),
            Ordering::Greater
        );
    }
}
