//! Opaque identity issued by the identity provider.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Globally unique user reference.
///
/// The value is opaque to the core; only equality and ordering are used.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wraps a provider-issued identifier.
    ///
    /// # Errors
    /// - Returns `ValidationFailed` when the value is blank or carries
    ///   leading or trailing whitespace. The value is never rewritten.
    pub fn new(value: impl Into<String>) -> CoreResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(CoreError::ValidationFailed(
                "identity cannot be empty".to_string(),
            ));
        }
        if trimmed.len() != value.len() {
            return Err(CoreError::ValidationFailed(format!(
                "identity `{value}` has surrounding whitespace"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
