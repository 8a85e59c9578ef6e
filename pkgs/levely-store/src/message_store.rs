//! Message store - persistence and read-state bookkeeping for chat messages
//!
//! Every committed insert or update is published on the [`ChangeFeed`] after
//! the transaction commits, so subscribers never observe a row that was
//! rolled back.

use chrono::Utc;
use sea_orm::prelude::Expr;
use sea_orm::*;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::entities::{conversations, messages};
use crate::error::{self, Result, StoreError};
use crate::feed::ChangeFeed;
use crate::models::{Conversation, Message, MessageChange, NewMessage};

/// Message store
#[derive(Clone)]
pub struct MessageStore {
    pub(crate) db: DatabaseConnection,
    pub(crate) feed: ChangeFeed,
}

impl MessageStore {
    pub fn new(db: DatabaseConnection, feed: ChangeFeed) -> Self {
        Self { db, feed }
    }

    /// Persist a message and bump its conversation's `last_message_at`.
    ///
    /// Re-submitting an id that is already stored returns the stored message
    /// without publishing a second insert.
    pub async fn insert(&self, new: NewMessage) -> Result<Message> {
        let has_text = new
            .content
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false);
        if !has_text && new.image_url.is_none() {
            return Err(StoreError::InvalidRequest(
                "Message has neither content nor image".to_string(),
            ));
        }

        let conversation: Conversation = conversations::Entity::find_by_id(new.conversation_id.clone())
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::ConversationNotFound(new.conversation_id.clone()))?
            .into();

        if conversation.counterpart_of(&new.sender_id) != Some(new.receiver_id.as_str()) {
            let user = if conversation.has_participant(&new.sender_id) {
                new.receiver_id.clone()
            } else {
                new.sender_id.clone()
            };
            return Err(StoreError::NotParticipant {
                conversation: conversation.id,
                user,
            });
        }

        let now = Utc::now().timestamp_millis();
        let model = messages::Model {
            id: new.id.clone(),
            conversation_id: new.conversation_id.clone(),
            sender_id: new.sender_id.clone(),
            receiver_id: new.receiver_id.clone(),
            content: new.content.clone(),
            image_url: new.image_url.clone(),
            is_read: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };

        let txn = self.db.begin().await?;
        let active = messages::ActiveModel {
            id: Set(model.id.clone()),
            conversation_id: Set(model.conversation_id.clone()),
            sender_id: Set(model.sender_id.clone()),
            receiver_id: Set(model.receiver_id.clone()),
            content: Set(model.content.clone()),
            image_url: Set(model.image_url.clone()),
            is_read: Set(false),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match messages::Entity::insert(active)
            .exec_without_returning(&txn)
            .await
        {
            Ok(_) => {}
            Err(e) if error::is_unique_violation(&e) => {
                txn.rollback().await?;
                let existing = self
                    .get(&new.id)
                    .await?
                    .ok_or_else(|| StoreError::MessageNotFound(new.id.clone()))?;
                if existing.conversation_id != new.conversation_id
                    || existing.sender_id != new.sender_id
                {
                    return Err(StoreError::InvalidRequest(format!(
                        "Message id {} is already in use",
                        new.id
                    )));
                }
                debug!("Message {} was already stored, returning it", new.id);
                return Ok(existing);
            }
            Err(e) => return Err(e.into()),
        }

        conversations::Entity::update_many()
            .col_expr(conversations::Column::LastMessageAt, Expr::value(now))
            .filter(conversations::Column::Id.eq(new.conversation_id.as_str()))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        let message = Message::from(model);
        debug!(
            "Stored message {} in conversation {}",
            message.id, message.conversation_id
        );
        self.feed.publish(MessageChange::insert(message.clone()));

        Ok(message)
    }

    /// Fetch one message, including soft-deleted ones.
    pub async fn get(&self, id: &str) -> Result<Option<Message>> {
        let msg = messages::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;

        Ok(msg.map(Message::from))
    }

    /// Visible history of a conversation, oldest first.
    pub async fn history(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let msgs = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .filter(messages::Column::DeletedAt.is_null())
            .order_by_asc(messages::Column::CreatedAt)
            .order_by_asc(messages::Column::Id)
            .all(&self.db)
            .await?;

        debug!(
            "Loaded {} messages for conversation {}",
            msgs.len(),
            conversation_id
        );
        Ok(msgs.into_iter().map(Message::from).collect())
    }

    /// Mark every unread message addressed to `receiver_id` in a conversation as read.
    ///
    /// Only ever flips `is_read` from false to true. Returns how many rows changed.
    pub async fn mark_read(&self, conversation_id: &str, receiver_id: &str) -> Result<u64> {
        let txn = self.db.begin().await?;

        let unread = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .filter(messages::Column::ReceiverId.eq(receiver_id))
            .filter(messages::Column::IsRead.eq(false))
            .all(&txn)
            .await?;

        if unread.is_empty() {
            txn.commit().await?;
            return Ok(0);
        }

        let now = Utc::now().timestamp_millis();
        let ids: Vec<String> = unread.iter().map(|m| m.id.clone()).collect();
        let result = messages::Entity::update_many()
            .col_expr(messages::Column::IsRead, Expr::value(true))
            .col_expr(messages::Column::UpdatedAt, Expr::value(now))
            .filter(messages::Column::Id.is_in(ids))
            .filter(messages::Column::IsRead.eq(false))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        for model in unread {
            let old = Message::from(model);
            let mut new = old.clone();
            new.is_read = true;
            new.updated_at = crate::models::from_millis(now);
            self.feed.publish(MessageChange::update(old, new));
        }

        info!(
            "Marked {} messages as read for {} in {}",
            result.rows_affected, receiver_id, conversation_id
        );
        Ok(result.rows_affected)
    }

    /// Soft-delete a message. Only its sender may do this; deleting twice is a no-op.
    pub async fn soft_delete(&self, message_id: &str, actor_id: &str) -> Result<Message> {
        let model = messages::Entity::find_by_id(message_id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;

        if model.sender_id != actor_id {
            return Err(StoreError::NotSender {
                message: message_id.to_string(),
                user: actor_id.to_string(),
            });
        }

        if model.deleted_at.is_some() {
            return Ok(model.into());
        }

        let old = Message::from(model.clone());
        let now = Utc::now().timestamp_millis();
        let mut active: messages::ActiveModel = model.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        let updated = Message::from(active.update(&self.db).await?);

        info!("Message {} deleted by {}", message_id, actor_id);
        self.feed.publish(MessageChange::update(old, updated.clone()));

        Ok(updated)
    }

    /// Most recent visible message of each conversation in `conversation_ids`
    pub async fn latest_per_conversation(
        &self,
        conversation_ids: &[String],
    ) -> Result<HashMap<String, Message>> {
        if conversation_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let msgs = messages::Entity::find()
            .filter(messages::Column::ConversationId.is_in(conversation_ids.iter().cloned()))
            .filter(messages::Column::DeletedAt.is_null())
            .order_by_desc(messages::Column::CreatedAt)
            .order_by_desc(messages::Column::Id)
            .all(&self.db)
            .await?;

        let mut latest = HashMap::new();
        for model in msgs {
            latest
                .entry(model.conversation_id.clone())
                .or_insert_with(|| Message::from(model));
        }
        Ok(latest)
    }

    /// Unread counts for `viewer_id`, keyed by conversation. Conversations with
    /// nothing unread are absent.
    pub async fn unread_counts(
        &self,
        viewer_id: &str,
        conversation_ids: &[String],
    ) -> Result<HashMap<String, u64>> {
        if conversation_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<String> = messages::Entity::find()
            .select_only()
            .column(messages::Column::ConversationId)
            .filter(messages::Column::ConversationId.is_in(conversation_ids.iter().cloned()))
            .filter(unread_for(viewer_id))
            .into_tuple::<String>()
            .all(&self.db)
            .await?;

        let mut counts = HashMap::new();
        for conversation_id in rows {
            *counts.entry(conversation_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    pub async fn unread_count(&self, conversation_id: &str, viewer_id: &str) -> Result<u64> {
        Ok(messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .filter(unread_for(viewer_id))
            .count(&self.db)
            .await?)
    }

    /// Unread messages addressed to `viewer_id` across all conversations
    pub async fn unread_total(&self, viewer_id: &str) -> Result<u64> {
        Ok(messages::Entity::find()
            .filter(unread_for(viewer_id))
            .count(&self.db)
            .await?)
    }
}

fn unread_for(viewer_id: &str) -> Condition {
    Condition::all()
        .add(messages::Column::ReceiverId.eq(viewer_id))
        .add(messages::Column::IsRead.eq(false))
        .add(messages::Column::DeletedAt.is_null())
}
