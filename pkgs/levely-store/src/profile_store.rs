//! Profile store - identity lookups for chat headers and previews

use sea_orm::*;
use tracing::debug;

use crate::entities::profiles;
use crate::error::Result;
use crate::models::Profile;

/// Profile store
#[derive(Clone)]
pub struct ProfileStore {
    db: DatabaseConnection,
}

impl ProfileStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert or update a profile
    pub async fn upsert(&self, profile: &Profile) -> Result<()> {
        let existing = profiles::Entity::find_by_id(profile.id.clone())
            .one(&self.db)
            .await?;

        if let Some(model) = existing {
            let mut active: profiles::ActiveModel = model.into();
            active.username = Set(profile.username.clone());
            active.avatar_url = Set(profile.avatar_url.clone());
            active.level = Set(profile.level);
            active.update(&self.db).await?;
        } else {
            let active = profiles::ActiveModel {
                id: Set(profile.id.clone()),
                username: Set(profile.username.clone()),
                avatar_url: Set(profile.avatar_url.clone()),
                level: Set(profile.level),
            };
            profiles::Entity::insert(active)
                .exec_without_returning(&self.db)
                .await?;
        }

        debug!("Saved profile {} ({})", profile.username, profile.id);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Profile>> {
        let profile = profiles::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;

        Ok(profile.map(Profile::from))
    }

    /// Batched lookup; ids without a profile are simply absent from the result.
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let found = profiles::Entity::find()
            .filter(profiles::Column::Id.is_in(ids.iter().cloned()))
            .all(&self.db)
            .await?;

        Ok(found.into_iter().map(Profile::from).collect())
    }
}
