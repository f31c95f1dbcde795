//! Parallel profile hydration for list screens.
//!
//! # Responsibility
//! - Resolve the profile behind each record of a list concurrently.
//! - Pair records with their resolved profiles for presentation.
//!
//! # Invariants
//! - Each distinct identity is fetched once and appears once in the result.
//! - Fail-fast: the first failed fetch fails the whole batch, outstanding
//!   fetches are dropped and no partial mapping is returned.

use crate::error::{CoreError, CoreResult};
use crate::model::identity::Identity;
use crate::model::memo::SharedDocument;
use crate::model::profile::Profile;
use crate::model::relationship::Relationship;
use crate::service::profile_service::ProfileService;
use futures::future::try_join_all;
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// List record paired with the profile it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydratedRecord<R> {
    pub record: R,
    pub profile: Profile,
}

pub struct DetailHydrator {
    profiles: ProfileService,
}

impl DetailHydrator {
    pub fn new(profiles: ProfileService) -> Self {
        Self { profiles }
    }

    /// Fetches the profile of every identity extracted from `records`.
    pub async fn hydrate<R, F>(
        &self,
        records: &[R],
        extract_identity: F,
    ) -> CoreResult<HashMap<Identity, Profile>>
    where
        F: Fn(&R) -> Identity,
    {
        let started_at = Instant::now();
        let mut seen = HashSet::new();
        let identities: Vec<Identity> = records
            .iter()
            .map(extract_identity)
            .filter(|identity| seen.insert(identity.clone()))
            .collect();

        let fetches = identities.iter().map(|identity| async move {
            let profile = self.profiles.get_profile(identity).await?;
            Ok::<_, CoreError>((identity.clone(), profile))
        });

        match try_join_all(fetches).await {
            Ok(resolved) => {
                info!(
                    "event=hydrate module=service status=ok records={} fetched={} duration_ms={}",
                    records.len(),
                    resolved.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(resolved.into_iter().collect())
            }
            Err(err) => {
                warn!(
                    "event=hydrate module=service status=error records={} error_code={} duration_ms={}",
                    records.len(),
                    err.code(),
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    /// Pairs each memo with the profile of the member that is not `me`.
    ///
    /// # Errors
    /// - `ValidationFailed` when `me` is not a member of some memo.
    pub async fn hydrate_memo_peers(
        &self,
        memos: Vec<SharedDocument>,
        me: &Identity,
    ) -> CoreResult<Vec<HydratedRecord<SharedDocument>>> {
        let mut peers = Vec::with_capacity(memos.len());
        for memo in &memos {
            let peer = memo.peer_of(me).ok_or_else(|| {
                CoreError::ValidationFailed(format!("memo `{}` has no peer for {me}", memo.id))
            })?;
            peers.push(peer.clone());
        }

        let mut profiles = self.hydrate(&peers, Identity::clone).await?;
        memos
            .into_iter()
            .zip(peers)
            .map(|(memo, peer)| {
                let profile = lookup(&mut profiles, &peer)?;
                Ok(HydratedRecord {
                    record: memo,
                    profile,
                })
            })
            .collect()
    }

    /// Pairs each friend edge with the peer profile, tagging the profile
    /// with the edge it was reached through.
    pub async fn hydrate_relationships(
        &self,
        relationships: Vec<Relationship>,
    ) -> CoreResult<Vec<HydratedRecord<Relationship>>> {
        let mut profiles = self
            .hydrate(&relationships, |relationship| relationship.peer.clone())
            .await?;
        relationships
            .into_iter()
            .map(|relationship| {
                let mut profile = lookup(&mut profiles, &relationship.peer)?;
                profile.friend_ref = Some(relationship.clone());
                Ok(HydratedRecord {
                    record: relationship,
                    profile,
                })
            })
            .collect()
    }
}

fn lookup(profiles: &mut HashMap<Identity, Profile>, identity: &Identity) -> CoreResult<Profile> {
    profiles
        .get(identity)
        .cloned()
        .ok_or_else(|| CoreError::NotFound(format!("profile for {identity}")))
}
