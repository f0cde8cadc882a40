use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::info;

use confguide_core::domain::profile::UserProfile;

use crate::file::{read_json, write_json};
use crate::{ProfileRepository, StorageError};

/// The single attendee profile, stored as one flat JSON object.
pub struct JsonUserStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonUserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProfileRepository for JsonUserStore {
    async fn save_profile(
        &self,
        profile_url: &str,
        mut profile: UserProfile,
    ) -> Result<UserProfile, StorageError> {
        let now = Utc::now().to_rfc3339();
        profile.insert("profileUrl", profile_url);
        profile.insert("timestamp", now.clone());
        profile.insert("lastUpdated", now);

        let _guard = self.write_lock.lock().await;
        write_json(&self.path, &profile).await?;
        info!(
            event_name = "storage.profile.saved",
            path = %self.path.display(),
            fields = profile.len(),
            "saved user profile"
        );
        Ok(profile)
    }

    async fn get_profile(&self) -> Result<Option<UserProfile>, StorageError> {
        let profile = read_json::<UserProfile>(&self.path).await?;
        Ok(profile.filter(|profile| !profile.is_empty()))
    }

    async fn profile_exists(&self, profile_url: Option<&str>) -> Result<bool, StorageError> {
        let Some(profile) = self.get_profile().await? else {
            return Ok(false);
        };
        Ok(match profile_url {
            Some(url) => profile.text("profileUrl") == Some(url),
            None => true,
        })
    }

    async fn clear_profile(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.path, &Value::Object(Map::new())).await?;
        info!(event_name = "storage.profile.cleared", path = %self.path.display(), "cleared user profile");
        Ok(())
    }
}
