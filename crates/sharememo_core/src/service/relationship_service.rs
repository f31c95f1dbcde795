//! Friend-pairing use-case service.
//!
//! # Responsibility
//! - List and check directed friend edges.
//! - Create friendships as owner→peer then peer→owner edge pairs.
//!
//! # Invariants
//! - No self-edges are ever written.
//! - Edge writes are keyed by peer identity, so re-running a pairing
//!   overwrites identical data instead of growing duplicates.
//! - The pair is not atomic: when the second write fails the first edge
//!   stays committed and the failure is returned to the caller.

use crate::auth::IdentityProvider;
use crate::error::{CoreError, CoreResult};
use crate::model::identity::Identity;
use crate::model::profile::Profile;
use crate::model::relationship::Relationship;
use crate::service::profile_service::ProfileService;
use crate::store::{friends_collection, DocumentStore};
use log::{error, info};
use std::sync::Arc;

pub struct RelationshipService {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    profiles: ProfileService,
}

impl RelationshipService {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        let profiles = ProfileService::new(Arc::clone(&store));
        Self {
            store,
            identity,
            profiles,
        }
    }

    /// Lists edges owned by `owner`.
    ///
    /// # Errors
    /// - `NotAuthenticated` when nobody is signed in.
    pub async fn list_relationships(&self, owner: &Identity) -> CoreResult<Vec<Relationship>> {
        self.identity.require_identity()?;
        let documents = self
            .store
            .query(&friends_collection(owner), None, None)
            .await?;

        documents
            .into_iter()
            .map(|document| {
                serde_json::from_value::<Relationship>(document.fields).map_err(|err| {
                    CoreError::ValidationFailed(format!(
                        "friend edge `{}` is malformed: {err}",
                        document.id
                    ))
                })
            })
            .collect()
    }

    /// Returns whether `candidate` already appears as a peer of `owner`.
    pub async fn is_already_friend(
        &self,
        owner: &Identity,
        candidate: &Identity,
    ) -> CoreResult<bool> {
        let relationships = self.list_relationships(owner).await?;
        Ok(relationships
            .iter()
            .any(|relationship| &relationship.peer == candidate))
    }

    /// Writes owner→peer, then peer→owner.
    ///
    /// # Errors
    /// - `SelfReferenceNotAllowed` when `owner == peer`.
    /// - `NotAuthenticated` when nobody is signed in.
    /// - `StoreUnavailable` from either write; a second-write failure
    ///   leaves the first edge in place.
    pub async fn establish_mutual_friendship(
        &self,
        owner: &Identity,
        peer: &Identity,
    ) -> CoreResult<()> {
        if owner == peer {
            return Err(CoreError::SelfReferenceNotAllowed);
        }
        self.identity.require_identity()?;

        self.write_edge(owner, peer).await?;
        if let Err(err) = self.write_edge(peer, owner).await {
            error!(
                "event=friend_pair module=service status=partial error_code={} detail=asymmetric_edge",
                err.code()
            );
            return Err(err);
        }

        info!("event=friend_pair module=service status=ok");
        Ok(())
    }

    /// Checks that the signed-in identity may befriend `candidate`.
    ///
    /// Returns the candidate profile so the caller can confirm the request.
    ///
    /// # Errors
    /// - `NotAuthenticated`, `SelfReferenceNotAllowed`.
    /// - `NotFound` when the candidate has no profile.
    /// - `AlreadyExists` when the candidate is already a friend.
    pub async fn validate_friend_request(&self, candidate: &Identity) -> CoreResult<Profile> {
        let me = self.identity.require_identity()?;
        if &me == candidate {
            return Err(CoreError::SelfReferenceNotAllowed);
        }

        let profile = self.profiles.get_profile(candidate).await?;
        if self.is_already_friend(&me, candidate).await? {
            return Err(CoreError::AlreadyExists(format!(
                "{} is already a friend",
                candidate
            )));
        }
        Ok(profile)
    }

    /// Validates and then pairs the signed-in identity with `candidate`.
    pub async fn add_friend(&self, candidate: &Identity) -> CoreResult<Profile> {
        let profile = self.validate_friend_request(candidate).await?;
        let me = self.identity.require_identity()?;
        self.establish_mutual_friendship(&me, candidate).await?;
        Ok(profile)
    }

    async fn write_edge(&self, owner: &Identity, peer: &Identity) -> CoreResult<()> {
        let fields = serde_json::to_value(Relationship::new(peer.clone()))
            .map_err(|err| CoreError::ValidationFailed(err.to_string()))?;
        self.store
            .put(&friends_collection(owner), peer.as_str(), fields)
            .await?;
        Ok(())
    }
}
