use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{MessagingError, Result};

/// Gameplay events shown as transient UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AppEvent {
    XpGained {
        amount: u32,
        reason: String,
    },
    AchievementUnlocked {
        title: String,
        description: String,
        icon: String,
        xp_reward: u32,
    },
}

/// Process-wide publish/subscribe bus. Listeners only see events published
/// while they are subscribed; nothing is replayed.
#[derive(Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<AppEvent>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many listeners received the event.
    pub fn publish(&self, event: AppEvent) -> usize {
        debug!("Publishing {:?}", event);
        self.sender.send(event).unwrap_or(0)
    }

    pub fn publish_xp(&self, amount: u32, reason: impl Into<String>) -> Result<usize> {
        if amount == 0 {
            return Err(MessagingError::InvalidXpAmount);
        }
        Ok(self.publish(AppEvent::XpGained {
            amount,
            reason: reason.into(),
        }))
    }

    pub fn publish_achievement(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
        icon: impl Into<String>,
        xp_reward: u32,
    ) -> usize {
        self.publish(AppEvent::AchievementUnlocked {
            title: title.into(),
            description: description.into(),
            icon: icon.into(),
            xp_reward,
        })
    }

    pub fn subscribe(&self) -> BusSubscription {
        BusSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub struct BusSubscription {
    receiver: broadcast::Receiver<AppEvent>,
}

impl BusSubscription {
    /// Next event, or `None` once every bus handle is gone.
    pub async fn recv(&mut self) -> Option<AppEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Notification listener lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<AppEvent> {
        self.receiver.try_recv().ok()
    }
}
