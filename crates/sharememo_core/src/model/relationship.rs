//! Directed friend edge stored under `users/{owner}/friends/{peer}`.

use crate::model::identity::Identity;
use serde::{Deserialize, Serialize};

/// One directed edge; the owner is implicit in the storage path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    /// Serialized as `uid` to match the stored edge body.
    #[serde(rename = "uid")]
    pub peer: Identity,
}

impl Relationship {
    pub fn new(peer: Identity) -> Self {
        Self { peer }
    }
}
