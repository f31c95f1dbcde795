//! Identity provider contract and in-process session implementation.
//!
//! Credential mechanics live outside the core; the core only asks who is
//! currently signed in.

use crate::error::{CoreError, CoreResult};
use crate::model::identity::Identity;
use log::info;
use std::sync::RwLock;

/// Source of the currently signed-in identity.
pub trait IdentityProvider: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;

    /// Returns the current identity or `NotAuthenticated`.
    fn require_identity(&self) -> CoreResult<Identity> {
        self.current_identity().ok_or(CoreError::NotAuthenticated)
    }
}

/// Session holder updated by the presentation layer after sign-in/out.
#[derive(Debug, Default)]
pub struct SessionIdentityProvider {
    current: RwLock<Option<Identity>>,
}

impl SessionIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(identity: Identity) -> Self {
        Self {
            current: RwLock::new(Some(identity)),
        }
    }

    pub fn sign_in(&self, identity: Identity) {
        // Poisoning only happens if a writer panicked; the value is still usable.
        let mut guard = self.current.write().unwrap_or_else(|err| err.into_inner());
        *guard = Some(identity);
        info!("event=session_sign_in module=auth status=ok");
    }

    pub fn sign_out(&self) {
        let mut guard = self.current.write().unwrap_or_else(|err| err.into_inner());
        *guard = None;
        info!("event=session_sign_out module=auth status=ok");
    }
}

impl IdentityProvider for SessionIdentityProvider {
    fn current_identity(&self) -> Option<Identity> {
        self.current
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::{IdentityProvider, SessionIdentityProvider};
    use crate::error::CoreError;
    use crate::model::identity::Identity;

    #[test]
    fn sign_in_and_out_drive_current_identity() {
        let session = SessionIdentityProvider::new();
        assert!(matches!(
            session.require_identity(),
            Err(CoreError::NotAuthenticated)
        ));

        session.sign_in(Identity::new("uid-1").unwrap());
        assert_eq!(session.require_identity().unwrap().as_str(), "uid-1");

        session.sign_out();
        assert_eq!(session.current_identity(), None);
    }
}
