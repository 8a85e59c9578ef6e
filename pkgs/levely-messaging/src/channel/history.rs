//! Visible message history of one channel
//!
//! Kept sorted by server creation time (ties broken by id) and free of
//! duplicate ids, whatever order the feed delivers in.

use levely_store::Message;

#[derive(Debug, Clone, Default)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn from_snapshot(mut messages: Vec<Message>) -> Self {
        messages.retain(|m| !m.is_deleted());
        messages.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        messages.dedup_by(|a, b| a.id == b.id);
        Self { messages }
    }

    /// Place a message at its server-time position. Returns false if the id
    /// is already present or the message is deleted.
    pub fn insert(&mut self, message: Message) -> bool {
        if message.is_deleted() || self.contains(&message.id) {
            return false;
        }

        let pos = self.messages.partition_point(|m| {
            (m.created_at, m.id.as_str()) <= (message.created_at, message.id.as_str())
        });
        self.messages.insert(pos, message);
        true
    }

    /// Replace a visible message in place. Read state never goes back to unread.
    pub fn update(&mut self, message: Message) -> Option<Message> {
        let existing = self.messages.iter_mut().find(|m| m.id == message.id)?;
        let was_read = existing.is_read;
        *existing = message;
        existing.is_read |= was_read;
        Some(existing.clone())
    }

    pub fn remove(&mut self, id: &str) -> Option<Message> {
        let pos = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(pos))
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn message(id: &str, offset_ms: i64) -> Message {
        let at = Utc::now() + Duration::milliseconds(offset_ms);
        Message {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            sender_id: "u1".to_string(),
            receiver_id: "u2".to_string(),
            content: Some(id.to_string()),
            image_url: None,
            is_read: false,
            deleted_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn ids(history: &History) -> Vec<&str> {
        history.as_slice().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_duplicate_insert_is_ignored() {
        let mut history = History::default();
        let m = message("m1", 0);
        assert!(history.insert(m.clone()));
        assert!(!history.insert(m));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_insert_orders_by_server_time() {
        let base = Utc::now();
        let mut mine = message("mine", 0);
        mine.created_at = base;
        let mut theirs = message("theirs", 0);
        theirs.created_at = base - Duration::milliseconds(50);

        let mut history = History::default();
        history.insert(mine);
        history.insert(theirs);
        assert_eq!(ids(&history), vec!["theirs", "mine"]);
    }

    #[test]
    fn test_snapshot_drops_deleted_and_sorts() {
        let mut deleted = message("gone", 5);
        deleted.deleted_at = Some(Utc::now());
        let history =
            History::from_snapshot(vec![message("b", 10), deleted, message("a", 0)]);
        assert_eq!(ids(&history), vec!["a", "b"]);
    }

    #[test]
    fn test_update_keeps_read_state() {
        let mut history = History::default();
        let mut m = message("m1", 0);
        m.is_read = true;
        history.insert(m.clone());

        let mut stale = m.clone();
        stale.is_read = false;
        let merged = history.update(stale).unwrap();
        assert!(merged.is_read);
        assert!(history.update(message("unknown", 0)).is_none());
    }
}
