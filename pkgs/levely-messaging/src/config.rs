//! Tunables for the messaging subsystem

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Messaging configuration. Every field has a default, so a partial JSON
/// document is enough to override a single value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// How long a typing signal stays visible after the last one (default: 3s)
    pub typing_window_ms: u64,

    /// Minimum gap between two outgoing typing broadcasts (default: 1s)
    pub typing_throttle_ms: u64,

    /// Lifetime of an XP toast (default: 3s)
    pub xp_toast_ms: u64,

    /// Lifetime of an achievement modal (default: 5s)
    pub achievement_modal_ms: u64,

    /// Lifetime of a new-message toast (default: 5s)
    pub message_toast_ms: u64,

    /// Largest accepted image attachment (default: 5 MiB)
    pub max_image_bytes: usize,

    /// Bucket receiving message images
    pub image_bucket: String,

    /// Content stored alongside an image-only message
    pub image_placeholder: String,

    /// Icon used for desktop notifications when the sender has no avatar
    pub default_avatar: String,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            typing_window_ms: 3_000,
            typing_throttle_ms: 1_000,
            xp_toast_ms: 3_000,
            achievement_modal_ms: 5_000,
            message_toast_ms: 5_000,
            max_image_bytes: 5 * 1024 * 1024,
            image_bucket: "message-images".to_string(),
            image_placeholder: "📷 Image".to_string(),
            default_avatar: "/default-avatar.png".to_string(),
        }
    }
}

impl MessagingConfig {
    pub fn typing_window(&self) -> Duration {
        Duration::from_millis(self.typing_window_ms)
    }

    pub fn typing_throttle(&self) -> Duration {
        Duration::from_millis(self.typing_throttle_ms)
    }

    pub fn xp_toast(&self) -> Duration {
        Duration::from_millis(self.xp_toast_ms)
    }

    pub fn achievement_modal(&self) -> Duration {
        Duration::from_millis(self.achievement_modal_ms)
    }

    pub fn message_toast(&self) -> Duration {
        Duration::from_millis(self.message_toast_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_override() {
        let config: MessagingConfig =
            serde_json::from_str(r#"{"typing_window_ms": 1500}"#).unwrap();
        assert_eq!(config.typing_window(), Duration::from_millis(1500));
        assert_eq!(config.xp_toast(), Duration::from_secs(3));
        assert_eq!(config.max_image_bytes, 5 * 1024 * 1024);
    }
}
