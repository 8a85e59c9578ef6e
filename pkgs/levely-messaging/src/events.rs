//! Events emitted to the UI layer and payloads carried on broadcast channels

use levely_store::Message;
use serde::{Deserialize, Serialize};

/// Event name used for typing broadcasts
pub const TYPING_EVENT: &str = "typing";

/// Name of the broadcast channel carrying a conversation's typing signals
pub fn typing_channel(conversation_id: &str) -> String {
    format!("typing-{}", conversation_id)
}

/// Ephemeral "user is typing" signal; never persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypingSignal {
    pub conversation_id: String,
    pub user_id: String,
}

/// Changes to an open message channel's view
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A message arrived from the feed and was placed in the history
    MessageAppended(Message),
    /// A visible message changed (read state)
    MessageUpdated(Message),
    /// A message left the visible history (soft delete)
    MessageRemoved { id: String },
    /// The counterpart sent a typing signal
    Typing { user_id: String },
    /// Unread messages addressed to the viewer were marked read
    MarkedRead { count: u64 },
    /// The live feed ended; history can still be reloaded manually
    FeedClosed,
}

/// Changes to a conversation directory
#[derive(Debug, Clone)]
pub enum DirectoryEvent {
    Refreshed { conversations: usize, unread_total: u64 },
    RefreshFailed(String),
    FeedClosed,
}
