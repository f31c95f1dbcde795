//! User profile record stored in the `users` collection.
//!
//! # Invariants
//! - `identity` is the document key and is never written into fields.
//! - `friend_ref` is a client-side annotation and is never persisted.
//! - `display_name` holds at most `MAX_DISPLAY_NAME_CHARS` characters.

use crate::error::{CoreError, CoreResult};
use crate::model::identity::Identity;
use crate::model::relationship::Relationship;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_DISPLAY_NAME_CHARS: usize = 8;

/// Public profile of one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub identity: Identity,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub profile_image_url: String,
    pub friend_ref: Option<Relationship>,
}

/// Stored field layout for `users/{identity}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileFields {
    email: String,
    username: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    profile_image_url: String,
}

impl Profile {
    /// Creates a fresh profile for a newly issued identity.
    pub fn new(identity: Identity, email: impl Into<String>) -> Self {
        Self {
            identity,
            email: email.into(),
            display_name: String::new(),
            created_at: Utc::now(),
            profile_image_url: String::new(),
            friend_ref: None,
        }
    }

    /// Rebuilds a profile from stored fields and its document key.
    pub fn from_fields(identity: Identity, fields: Value) -> serde_json::Result<Self> {
        let stored: ProfileFields = serde_json::from_value(fields)?;
        Ok(Self {
            identity,
            email: stored.email,
            display_name: stored.username,
            created_at: stored.created_at,
            profile_image_url: stored.profile_image_url,
            friend_ref: None,
        })
    }

    /// Serializes persisted fields, leaving out the document key.
    pub fn to_fields(&self) -> serde_json::Result<Value> {
        serde_json::to_value(ProfileFields {
            email: self.email.clone(),
            username: self.display_name.clone(),
            created_at: self.created_at,
            profile_image_url: self.profile_image_url.clone(),
        })
    }

    /// Checks mutable fields before persistence.
    pub fn validate(&self) -> CoreResult<()> {
        let chars = self.display_name.chars().count();
        if chars > MAX_DISPLAY_NAME_CHARS {
            return Err(CoreError::ValidationFailed(format!(
                "display name has {chars} characters; at most {MAX_DISPLAY_NAME_CHARS} allowed"
            )));
        }
        Ok(())
    }
}
