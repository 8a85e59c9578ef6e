//! Conversation store - one conversation per unordered pair of users

use chrono::Utc;
use sea_orm::*;
use tracing::{debug, info};

use crate::entities::conversations;
use crate::error::{self, Result, StoreError};
use crate::models::Conversation;

/// Conversation store
#[derive(Clone)]
pub struct ConversationStore {
    pub(crate) db: DatabaseConnection,
}

impl ConversationStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Return the conversation between `user_a` and `user_b`, creating it if needed.
    ///
    /// Argument order does not matter: the pair is stored sorted, and the unique
    /// index on it makes a concurrent creator lose the race and read the winner.
    pub async fn get_or_create(&self, user_a: &str, user_b: &str) -> Result<Conversation> {
        if user_a.is_empty() || user_b.is_empty() {
            return Err(StoreError::InvalidRequest("User id is empty".to_string()));
        }
        if user_a == user_b {
            return Err(StoreError::InvalidRequest(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }

        let (participant_a, participant_b) = normalize_pair(user_a, user_b);

        if let Some(existing) = self.find_by_pair(participant_a, participant_b).await? {
            debug!("Conversation {} already exists", existing.id);
            return Ok(existing.into());
        }

        let now = Utc::now().timestamp_millis();
        let model = conversations::Model {
            id: uuid::Uuid::new_v4().to_string(),
            participant_a: participant_a.to_string(),
            participant_b: participant_b.to_string(),
            last_message_at: now,
            created_at: now,
        };

        let active = conversations::ActiveModel {
            id: Set(model.id.clone()),
            participant_a: Set(model.participant_a.clone()),
            participant_b: Set(model.participant_b.clone()),
            last_message_at: Set(now),
            created_at: Set(now),
        };

        match conversations::Entity::insert(active)
            .exec_without_returning(&self.db)
            .await
        {
            Ok(_) => {
                info!(
                    "Created conversation {} between {} and {}",
                    model.id, participant_a, participant_b
                );
                Ok(model.into())
            }
            Err(e) if error::is_unique_violation(&e) => {
                // Another writer created it first
                let existing = self
                    .find_by_pair(participant_a, participant_b)
                    .await?
                    .ok_or_else(|| {
                        StoreError::InvalidRequest(
                            "Conversation vanished after concurrent insert".to_string(),
                        )
                    })?;
                Ok(existing.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Conversation>> {
        let conv = conversations::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;

        Ok(conv.map(Conversation::from))
    }

    /// Like [`get`](Self::get) but a missing conversation is an error.
    pub async fn require(&self, id: &str) -> Result<Conversation> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))
    }

    /// All conversations involving `user_id`, most recently active first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let convs = conversations::Entity::find()
            .filter(
                Condition::any()
                    .add(conversations::Column::ParticipantA.eq(user_id))
                    .add(conversations::Column::ParticipantB.eq(user_id)),
            )
            .order_by_desc(conversations::Column::LastMessageAt)
            .order_by_asc(conversations::Column::Id)
            .all(&self.db)
            .await?;

        debug!("Found {} conversations for {}", convs.len(), user_id);
        Ok(convs.into_iter().map(Conversation::from).collect())
    }

    async fn find_by_pair(
        &self,
        participant_a: &str,
        participant_b: &str,
    ) -> Result<Option<conversations::Model>> {
        Ok(conversations::Entity::find()
            .filter(conversations::Column::ParticipantA.eq(participant_a))
            .filter(conversations::Column::ParticipantB.eq(participant_b))
            .one(&self.db)
            .await?)
    }
}

/// Sort a pair so the lexicographically smaller id comes first.
pub fn normalize_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pair() {
        assert_eq!(normalize_pair("u2", "u1"), ("u1", "u2"));
        assert_eq!(normalize_pair("u1", "u2"), ("u1", "u2"));
    }
}
