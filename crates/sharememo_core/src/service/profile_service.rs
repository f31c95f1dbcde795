//! Profile use-case service.
//!
//! # Responsibility
//! - Fetch profiles and merge the document key back in as `identity`.
//! - Save/delete profiles and manage profile images.

use crate::error::{CoreError, CoreResult};
use crate::model::identity::Identity;
use crate::model::profile::Profile;
use crate::store::{fields, DocumentStore, PROFILE_IMAGES, USERS};
use log::{info, warn};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn DocumentStore>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Gets one profile by identity.
    ///
    /// # Errors
    /// - `NotFound` when no profile document exists.
    /// - `ValidationFailed` when stored fields are malformed.
    pub async fn get_profile(&self, identity: &Identity) -> CoreResult<Profile> {
        let document = self
            .store
            .get(USERS, identity.as_str())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("{USERS}/{identity}")))?;
        Profile::from_fields(identity.clone(), document.fields).map_err(|err| {
            CoreError::ValidationFailed(format!("profile `{identity}` has malformed fields: {err}"))
        })
    }

    /// Creates or replaces a profile document.
    pub async fn save_profile(&self, profile: &Profile) -> CoreResult<()> {
        profile.validate()?;
        let fields = profile
            .to_fields()
            .map_err(|err| CoreError::ValidationFailed(err.to_string()))?;
        self.store
            .put(USERS, profile.identity.as_str(), fields)
            .await?;
        info!("event=profile_save module=service status=ok");
        Ok(())
    }

    /// Stores image bytes and returns their download url.
    pub async fn upload_profile_image(&self, bytes: Vec<u8>) -> CoreResult<String> {
        if bytes.is_empty() {
            return Err(CoreError::ValidationFailed(
                "profile image cannot be empty".to_string(),
            ));
        }
        Ok(self.store.upload_blob(PROFILE_IMAGES, bytes).await?)
    }

    /// Points an existing profile at a new image url.
    pub async fn update_profile_image(&self, identity: &Identity, url: &str) -> CoreResult<()> {
        let mut partial = Map::new();
        partial.insert(
            fields::PROFILE_IMAGE_URL.to_string(),
            Value::String(url.to_string()),
        );
        self.store
            .update(USERS, identity.as_str(), Value::Object(partial))
            .await?;
        Ok(())
    }

    /// Uploads bytes, then records the url on the profile.
    ///
    /// An upload whose profile update fails leaves an orphan blob.
    pub async fn replace_profile_image(
        &self,
        identity: &Identity,
        bytes: Vec<u8>,
    ) -> CoreResult<String> {
        let url = self.upload_profile_image(bytes).await?;
        if let Err(err) = self.update_profile_image(identity, &url).await {
            warn!(
                "event=profile_image_replace module=service status=error error_code={}",
                err.code()
            );
            return Err(err);
        }
        info!("event=profile_image_replace module=service status=ok");
        Ok(url)
    }

    /// Removes the profile document; friend edges and memos are left alone.
    pub async fn delete_profile(&self, identity: &Identity) -> CoreResult<()> {
        self.store.delete(USERS, identity.as_str()).await?;
        info!("event=profile_delete module=service status=ok");
        Ok(())
    }
}
