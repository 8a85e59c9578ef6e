//! Row-level change feed for the messages table
//!
//! Every committed insert/update is published to a single tokio broadcast
//! channel. Subscribers narrow it down with a [`FeedFilter`] and a set of
//! [`ChangeKind`]s; filtering happens on the receiving side.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::models::{ChangeKind, MessageChange};

/// Which rows a subscription is interested in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFilter {
    All,
    Conversation(String),
    Receiver(String),
}

impl FeedFilter {
    pub fn matches(&self, change: &MessageChange) -> bool {
        match self {
            FeedFilter::All => true,
            FeedFilter::Conversation(id) => change.new.conversation_id == *id,
            FeedFilter::Receiver(id) => change.new.receiver_id == *id,
        }
    }
}

/// Publisher side of the change feed
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<MessageChange>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a change; returns how many subscriptions received it.
    pub fn publish(&self, change: MessageChange) -> usize {
        debug!(
            "Publishing {:?} for message {} in {}",
            change.kind, change.new.id, change.new.conversation_id
        );
        self.sender.send(change).unwrap_or(0)
    }

    pub fn subscribe(&self, filter: FeedFilter, kinds: &[ChangeKind]) -> FeedSubscription {
        FeedSubscription {
            receiver: Some(self.sender.subscribe()),
            filter,
            kinds: kinds.to_vec(),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving side of one feed subscription
pub struct FeedSubscription {
    receiver: Option<broadcast::Receiver<MessageChange>>,
    filter: FeedFilter,
    kinds: Vec<ChangeKind>,
}

impl FeedSubscription {
    /// Next matching change. `None` once unsubscribed or the feed is gone.
    pub async fn recv(&mut self) -> Option<MessageChange> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(change) => {
                    if self.kinds.contains(&change.kind) && self.filter.matches(&change) {
                        return Some(change);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Feed subscription {:?} lagged, {} changes skipped",
                        self.filter, skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// Stop receiving. Safe to call any number of times.
    pub fn unsubscribe(&mut self) {
        if self.receiver.take().is_some() {
            debug!("Unsubscribed from feed {:?}", self.filter);
        }
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    pub fn filter(&self) -> &FeedFilter {
        &self.filter
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;
    use chrono::Utc;

    fn message(id: &str, conversation: &str, receiver: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation.to_string(),
            sender_id: "sender".to_string(),
            receiver_id: receiver.to_string(),
            content: Some("hi".to_string()),
            image_url: None,
            is_read: false,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_filter_by_conversation() {
        let feed = ChangeFeed::new(16);
        let mut sub = feed.subscribe(
            FeedFilter::Conversation("c2".to_string()),
            &[ChangeKind::Insert],
        );

        feed.publish(MessageChange::insert(message("m1", "c1", "u1")));
        feed.publish(MessageChange::insert(message("m2", "c2", "u1")));

        let change = sub.recv().await.unwrap();
        assert_eq!(change.new.id, "m2");
    }

    #[tokio::test]
    async fn test_filter_by_kind() {
        let feed = ChangeFeed::new(16);
        let mut sub = feed.subscribe(FeedFilter::All, &[ChangeKind::Update]);

        let m = message("m1", "c1", "u1");
        feed.publish(MessageChange::insert(m.clone()));
        let mut read = m.clone();
        read.is_read = true;
        feed.publish(MessageChange::update(m, read));

        let change = sub.recv().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Update);
        assert!(change.new.is_read);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let feed = ChangeFeed::new(16);
        let mut sub = feed.subscribe(FeedFilter::Receiver("u1".to_string()), &[ChangeKind::Insert]);
        assert_eq!(feed.subscriber_count(), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(feed.subscriber_count(), 0);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_drop_releases_subscription() {
        let feed = ChangeFeed::new(16);
        {
            let _sub = feed.subscribe(FeedFilter::All, &[ChangeKind::Insert]);
            assert_eq!(feed.subscriber_count(), 1);
        }
        assert_eq!(feed.subscriber_count(), 0);
    }
}
