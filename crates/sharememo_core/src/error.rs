//! Core error taxonomy exposed to presentation callers.
//!
//! # Responsibility
//! - Define the typed failures every public core operation can return.
//! - Map storage-layer failures into caller-facing semantics.
//!
//! # Invariants
//! - Core operations never retry; each failure is returned exactly once.
//! - Transport/backend failures always surface as `StoreUnavailable`.

use crate::store::StoreError;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Typed failure returned by relationship, memo, hydration and sync APIs.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No identity is signed in.
    #[error("no authenticated identity")]
    NotAuthenticated,
    /// An identity tried to befriend or share a memo with itself.
    #[error("an identity cannot pair with itself")]
    SelfReferenceNotAllowed,
    /// Target relationship or shared document already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Requested document does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Blob upload succeeded but no download url could be resolved.
    #[error("download url unavailable for blob `{0}`")]
    DownloadUrlUnavailable(String),
    /// Document store transport or backend failure.
    #[error("document store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
    /// Input rejected before reaching the store.
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    /// Sync session used outside the `Subscribed` state.
    #[error("invalid session state: expected {expected}, found {found}")]
    InvalidSessionState {
        expected: &'static str,
        found: &'static str,
    },
}

impl From<StoreError> for CoreError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { collection, id } => Self::NotFound(format!("{collection}/{id}")),
            StoreError::DownloadUrlUnavailable(name) => Self::DownloadUrlUnavailable(name),
            other => Self::StoreUnavailable(other),
        }
    }
}

impl CoreError {
    /// Stable machine-readable code for FFI envelopes and log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::SelfReferenceNotAllowed => "self_reference_not_allowed",
            Self::AlreadyExists(_) => "already_exists",
            Self::NotFound(_) => "not_found",
            Self::DownloadUrlUnavailable(_) => "download_url_unavailable",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::ValidationFailed(_) => "validation_failed",
            Self::InvalidSessionState { .. } => "invalid_session_state",
        }
    }
}
