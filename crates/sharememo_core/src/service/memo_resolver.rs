//! Shared memo resolution use-case service.
//!
//! # Responsibility
//! - Decide whether a shared memo exists for an identity pair.
//! - Create the pair's memo on first contact and list/rename memos.
//!
//! # Invariants
//! - At most one memo per unordered pair is expected. Creation is
//!   check-then-act without a lock, so two peers creating at the same moment
//!   can both succeed; lookups then pick the earliest `last_modified_at`
//!   (ties broken by id) so both peers converge on the same memo.
//! - Membership is never rewritten after creation.

use crate::auth::IdentityProvider;
use crate::error::{CoreError, CoreResult};
use crate::model::identity::Identity;
use crate::model::memo::{title_update_fields, validate_title, MemoId, SharedDocument};
use crate::model::relationship::Relationship;
use crate::store::{fields, Document, DocumentStore, Filter, OrderBy, MEMOS};
use log::{info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

pub struct MemoResolver {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl MemoResolver {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// Finds the memo whose members are exactly `{a, b}`.
    ///
    /// Fetches every memo containing either identity, then filters to the
    /// exact pair. Symmetric in `a` and `b`.
    pub async fn find_shared_document(
        &self,
        a: &Identity,
        b: &Identity,
    ) -> CoreResult<Option<SharedDocument>> {
        self.identity.require_identity()?;
        let filter = Filter::array_contains_any(
            fields::MEMBERS,
            [Value::from(a.as_str()), Value::from(b.as_str())],
        );
        let documents = self.store.query(MEMOS, Some(&filter), None).await?;
        let memos = parse_memos(documents)?;

        let mut matches: Vec<SharedDocument> = memos
            .into_iter()
            .filter(|memo| memo.is_shared_by(a, b))
            .collect();
        if matches.len() > 1 {
            warn!(
                "event=memo_resolve module=service status=duplicate count={}",
                matches.len()
            );
        }
        matches.sort_by(|left, right| {
            left.last_modified_at
                .cmp(&right.last_modified_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(matches.into_iter().next())
    }

    /// Creates the pair's memo unless one already exists.
    ///
    /// # Errors
    /// - `SelfReferenceNotAllowed` when `a == b`.
    /// - `ValidationFailed` for a blank or over-long title.
    /// - `AlreadyExists` when the pair already shares a memo.
    pub async fn create_shared_document_if_absent(
        &self,
        a: &Identity,
        b: &Identity,
        title: &str,
    ) -> CoreResult<SharedDocument> {
        let memo = SharedDocument::new(a.clone(), b.clone(), title)?;
        if let Some(existing) = self.find_shared_document(a, b).await? {
            return Err(CoreError::AlreadyExists(format!(
                "{MEMOS}/{}",
                existing.id
            )));
        }

        let fields = memo
            .to_fields()
            .map_err(|err| CoreError::ValidationFailed(err.to_string()))?;
        self.store.put(MEMOS, &memo.id, fields).await?;
        info!("event=memo_create module=service status=ok memo_id={}", memo.id);
        Ok(memo)
    }

    /// Fails with `AlreadyExists` when the pair already shares a memo.
    pub async fn ensure_no_shared_document(&self, a: &Identity, b: &Identity) -> CoreResult<()> {
        match self.find_shared_document(a, b).await? {
            Some(existing) => Err(CoreError::AlreadyExists(format!(
                "{MEMOS}/{}",
                existing.id
            ))),
            None => Ok(()),
        }
    }

    pub async fn get_shared_document(&self, id: &str) -> CoreResult<SharedDocument> {
        self.identity.require_identity()?;
        let document = self
            .store
            .get(MEMOS, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("{MEMOS}/{id}")))?;
        SharedDocument::from_fields(document.id, document.fields)
    }

    /// Lists memos containing `identity`, most recently modified first.
    pub async fn latest_documents_for(
        &self,
        identity: &Identity,
    ) -> CoreResult<Vec<SharedDocument>> {
        self.identity.require_identity()?;
        let filter = Filter::array_contains(fields::MEMBERS, identity.as_str());
        let order = OrderBy::descending(fields::LATEST_UPDATE);
        let documents = self.store.query(MEMOS, Some(&filter), Some(&order)).await?;
        parse_memos(documents)
    }

    /// Renames a memo without touching its content.
    pub async fn rename_shared_document(&self, id: &MemoId, title: &str) -> CoreResult<()> {
        self.identity.require_identity()?;
        validate_title(title)?;
        self.store
            .update(MEMOS, id, title_update_fields(title))
            .await?;
        info!("event=memo_rename module=service status=ok memo_id={id}");
        Ok(())
    }

    /// Filters `friends` down to peers that share no memo with `owner` yet.
    pub async fn friends_without_memo(
        &self,
        owner: &Identity,
        friends: &[Relationship],
    ) -> CoreResult<Vec<Relationship>> {
        let memos = self.latest_documents_for(owner).await?;
        let paired: HashSet<&Identity> = memos
            .iter()
            .filter_map(|memo| memo.peer_of(owner))
            .collect();
        Ok(friends
            .iter()
            .filter(|friend| !paired.contains(&friend.peer))
            .cloned()
            .collect())
    }
}

fn parse_memos(documents: Vec<Document>) -> CoreResult<Vec<SharedDocument>> {
    documents
        .into_iter()
        .map(|document| SharedDocument::from_fields(document.id, document.fields))
        .collect()
}
