//! Typing visibility as a logical TTL
//!
//! Each sender has a last-seen instant; a sender counts as typing while
//! `now - last_seen < window`. Nothing is scheduled, so nothing can leak when
//! the channel goes away.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct TypingTracker {
    window: Duration,
    last_seen: HashMap<String, Instant>,
}

impl TypingTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    pub fn touch(&mut self, user_id: &str, at: Instant) {
        self.last_seen.insert(user_id.to_string(), at);
    }

    pub fn clear(&mut self, user_id: &str) {
        self.last_seen.remove(user_id);
    }

    pub fn clear_all(&mut self) {
        self.last_seen.clear();
    }

    pub fn is_typing_at(&self, user_id: &str, now: Instant) -> bool {
        self.last_seen
            .get(user_id)
            .map(|seen| now.saturating_duration_since(*seen) < self.window)
            .unwrap_or(false)
    }

    /// Users typing at `now`; expired entries are dropped.
    pub fn typing_at(&mut self, now: Instant) -> Vec<String> {
        let window = self.window;
        self.last_seen
            .retain(|_, seen| now.saturating_duration_since(*seen) < window);

        let mut users: Vec<String> = self.last_seen.keys().cloned().collect();
        users.sort();
        users
    }
}
