//! Public record types exposed by the store

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{conversations, messages, profiles};

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
}

/// Public identity of a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub level: i32,
}

impl From<profiles::Model> for Profile {
    fn from(model: profiles::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            avatar_url: model.avatar_url,
            level: model.level,
        }
    }
}

/// A one-to-one conversation between two users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }

    /// The other participant, or `None` if `viewer` is not part of this conversation.
    pub fn counterpart_of(&self, viewer: &str) -> Option<&str> {
        if self.participant_a == viewer {
            Some(&self.participant_b)
        } else if self.participant_b == viewer {
            Some(&self.participant_a)
        } else {
            None
        }
    }
}

impl From<conversations::Model> for Conversation {
    fn from(model: conversations::Model) -> Self {
        Self {
            id: model.id,
            participant_a: model.participant_a,
            participant_b: model.participant_b,
            last_message_at: from_millis(model.last_message_at),
            created_at: from_millis(model.created_at),
        }
    }
}

/// A chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub is_read: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Text shown in previews; image-only messages have no text.
    pub fn preview(&self) -> Option<&str> {
        self.content.as_deref()
    }
}

impl From<messages::Model> for Message {
    fn from(model: messages::Model) -> Self {
        Self {
            id: model.id,
            conversation_id: model.conversation_id,
            sender_id: model.sender_id,
            receiver_id: model.receiver_id,
            content: model.content,
            image_url: model.image_url,
            is_read: model.is_read,
            deleted_at: model.deleted_at.map(from_millis),
            created_at: from_millis(model.created_at),
            updated_at: from_millis(model.updated_at),
        }
    }
}

/// Message as submitted by a sender; the id is chosen by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: Option<String>,
    pub image_url: Option<String>,
}

impl NewMessage {
    pub fn text(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            content: Some(content.into()),
            image_url: None,
        }
    }
}

/// Kind of row-level change published on the feed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Update,
}

/// Row-level change to the messages table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageChange {
    pub kind: ChangeKind,
    pub new: Message,
    pub old: Option<Message>,
}

impl MessageChange {
    pub fn insert(message: Message) -> Self {
        Self {
            kind: ChangeKind::Insert,
            new: message,
            old: None,
        }
    }

    pub fn update(old: Message, new: Message) -> Self {
        Self {
            kind: ChangeKind::Update,
            new,
            old: Some(old),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Conversation {
        Conversation {
            id: "c1".to_string(),
            participant_a: "u1".to_string(),
            participant_b: "u2".to_string(),
            last_message_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_counterpart_of() {
        let conv = conversation();
        assert_eq!(conv.counterpart_of("u1"), Some("u2"));
        assert_eq!(conv.counterpart_of("u2"), Some("u1"));
        assert_eq!(conv.counterpart_of("u3"), None);
    }

    #[test]
    fn test_from_millis_roundtrip() {
        let now = Utc::now();
        let ms = now.timestamp_millis();
        assert_eq!(from_millis(ms).timestamp_millis(), ms);
    }
}
