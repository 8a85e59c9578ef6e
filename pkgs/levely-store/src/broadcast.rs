//! Ephemeral named broadcast channels (typing indicators and the like)
//!
//! Nothing here is persisted. A publish with no current subscriber is dropped.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 64;

type Channels = Mutex<HashMap<String, broadcast::Sender<BroadcastEnvelope>>>;

/// One broadcast as seen by subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    pub channel: String,
    pub event: String,
    pub payload: serde_json::Value,
}

/// Registry of named broadcast channels
#[derive(Clone, Default)]
pub struct BroadcastHub {
    channels: Arc<Channels>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best-effort publish; returns the number of subscribers reached.
    pub fn publish(&self, channel: &str, event: &str, payload: serde_json::Value) -> usize {
        let mut channels = self.channels.lock();
        let Some(sender) = channels.get(channel) else {
            return 0;
        };

        if sender.receiver_count() == 0 {
            channels.remove(channel);
            return 0;
        }

        let envelope = BroadcastEnvelope {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
        };
        let delivered = sender.send(envelope).unwrap_or(0);
        debug!("Broadcast '{}' on {} reached {}", event, channel, delivered);
        delivered
    }

    pub fn subscribe(&self, channel: &str, event: &str) -> BroadcastSubscription {
        let receiver = self
            .channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        BroadcastSubscription {
            receiver: Some(receiver),
            event: event.to_string(),
            channel: channel.to_string(),
            hub: Arc::downgrade(&self.channels),
        }
    }

    /// Number of channels with a registered sender
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

/// Receiving side of a broadcast subscription, scoped to one event name
pub struct BroadcastSubscription {
    receiver: Option<broadcast::Receiver<BroadcastEnvelope>>,
    event: String,
    channel: String,
    hub: Weak<Channels>,
}

impl BroadcastSubscription {
    pub async fn recv(&mut self) -> Option<BroadcastEnvelope> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(envelope) if envelope.event == self.event => return Some(envelope),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Broadcast subscription lagged, {} skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.unsubscribe();
                    return None;
                }
            }
        }
    }

    /// Stop receiving. The channel is dropped from the hub once its last
    /// subscriber leaves. Idempotent.
    pub fn unsubscribe(&mut self) {
        if self.receiver.take().is_none() {
            return;
        }
        let Some(channels) = self.hub.upgrade() else {
            return;
        };
        let mut channels = channels.lock();
        let idle = channels
            .get(&self.channel)
            .is_some_and(|sender| sender.receiver_count() == 0);
        if idle {
            channels.remove(&self.channel);
            debug!("Removed idle broadcast channel {}", self.channel);
        }
    }
}

impl Drop for BroadcastSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_matching_event_only() {
        let hub = BroadcastHub::new();
        let mut typing = hub.subscribe("typing-c1", "typing");

        assert_eq!(hub.publish("typing-c1", "other", json!({})), 1);
        assert_eq!(hub.publish("typing-c1", "typing", json!({"user_id": "u1"})), 1);

        let envelope = typing.recv().await.unwrap();
        assert_eq!(envelope.event, "typing");
        assert_eq!(envelope.payload["user_id"], "u1");
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let hub = BroadcastHub::new();
        assert_eq!(hub.publish("nobody", "typing", json!({})), 0);

        let sub = hub.subscribe("c1", "typing");
        drop(sub);
        assert_eq!(hub.publish("c1", "typing", json!({})), 0);
        assert_eq!(hub.subscriber_count("c1"), 0);
    }

    #[test]
    fn test_last_unsubscribe_removes_channel() {
        let hub = BroadcastHub::new();
        let mut first = hub.subscribe("typing-c1", "typing");
        let second = hub.subscribe("typing-c1", "typing");
        let _other = hub.subscribe("typing-c2", "typing");
        assert_eq!(hub.channel_count(), 2);

        first.unsubscribe();
        first.unsubscribe();
        assert_eq!(hub.subscriber_count("typing-c1"), 1);
        assert_eq!(hub.channel_count(), 2);

        // Closed without anyone publishing afterwards
        drop(second);
        assert_eq!(hub.channel_count(), 1);
        assert_eq!(hub.subscriber_count("typing-c2"), 1);
    }

    #[test]
    fn test_subscription_outliving_hub() {
        let hub = BroadcastHub::new();
        let sub = hub.subscribe("typing-c1", "typing");
        drop(hub);
        drop(sub);
    }
}
