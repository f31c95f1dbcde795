//! Shared memo document stored in the `memos` collection.
//!
//! # Responsibility
//! - Define the single mutable text document shared by one identity pair.
//! - Provide pair-membership helpers used by the resolver and hydrator.
//!
//! # Invariants
//! - `members` holds exactly two distinct identities and never changes.
//! - `title` is non-blank and at most `MAX_TITLE_CHARS` characters.
//! - `id` is the document key and is never written into fields.

use crate::error::{CoreError, CoreResult};
use crate::model::identity::Identity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

pub const MAX_TITLE_CHARS: usize = 15;

/// Store-assigned memo key.
pub type MemoId = String;

/// Text document shared by exactly one pair of identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedDocument {
    pub id: MemoId,
    pub title: String,
    pub members: [Identity; 2],
    pub content: String,
    pub last_modified_at: DateTime<Utc>,
}

/// Stored field layout for `memos/{id}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemoFields {
    name: String,
    members: Vec<Identity>,
    content: String,
    latest_update: DateTime<Utc>,
}

impl SharedDocument {
    /// Creates an empty memo for a pair with a freshly generated key.
    pub fn new(a: Identity, b: Identity, title: impl Into<String>) -> CoreResult<Self> {
        if a == b {
            return Err(CoreError::SelfReferenceNotAllowed);
        }
        let title = title.into();
        validate_title(&title)?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            title,
            members: [a, b],
            content: String::new(),
            last_modified_at: Utc::now(),
        })
    }

    /// Rebuilds a memo from stored fields and its document key.
    ///
    /// Rejects stored membership that is not exactly two distinct identities.
    pub fn from_fields(id: impl Into<MemoId>, fields: Value) -> CoreResult<Self> {
        let id = id.into();
        let stored: MemoFields = serde_json::from_value(fields).map_err(|err| {
            CoreError::ValidationFailed(format!("memo `{id}` has malformed fields: {err}"))
        })?;
        let members: [Identity; 2] = stored.members.try_into().map_err(|found: Vec<Identity>| {
            CoreError::ValidationFailed(format!(
                "memo `{id}` must have exactly 2 members, found {}",
                found.len()
            ))
        })?;
        if members[0] == members[1] {
            return Err(CoreError::ValidationFailed(format!(
                "memo `{id}` members must be distinct, found `{}` twice",
                members[0]
            )));
        }
        Ok(Self {
            id,
            title: stored.name,
            members,
            content: stored.content,
            last_modified_at: stored.latest_update,
        })
    }

    /// Serializes persisted fields, leaving out the document key.
    pub fn to_fields(&self) -> serde_json::Result<Value> {
        serde_json::to_value(MemoFields {
            name: self.title.clone(),
            members: self.members.to_vec(),
            content: self.content.clone(),
            latest_update: self.last_modified_at,
        })
    }

    /// Returns whether this memo's member set equals `{a, b}`.
    pub fn is_shared_by(&self, a: &Identity, b: &Identity) -> bool {
        let [first, second] = &self.members;
        (first == a && second == b) || (first == b && second == a)
    }

    /// Returns the member that is not `me`, if `me` belongs to the memo.
    pub fn peer_of(&self, me: &Identity) -> Option<&Identity> {
        let [first, second] = &self.members;
        if first == me {
            Some(second)
        } else if second == me {
            Some(first)
        } else {
            None
        }
    }
}

/// Partial fields written by a content sync.
pub fn content_update_fields(content: &str, at: DateTime<Utc>) -> Value {
    json!({
        "content": content,
        "latestUpdate": at,
    })
}

/// Partial fields written by a rename.
pub fn title_update_fields(title: &str) -> Value {
    json!({ "name": title })
}

pub fn validate_title(title: &str) -> CoreResult<()> {
    if title.trim().is_empty() {
        return Err(CoreError::ValidationFailed(
            "memo title cannot be blank".to_string(),
        ));
    }
    let chars = title.chars().count();
    if chars > MAX_TITLE_CHARS {
        return Err(CoreError::ValidationFailed(format!(
            "memo title has {chars} characters; at most {MAX_TITLE_CHARS} allowed"
        )));
    }
    Ok(())
}
