//! Levely Messaging - real-time one-to-one chat and in-app notifications
//!
//! This library provides:
//! - Message channels: live history of one conversation, read marking,
//!   typing indicators, image attachments and soft delete
//! - Conversation directory: every conversation of a user with counterpart,
//!   latest message and unread count, rebuilt on each change
//! - Notification fan-out: XP/achievement toasts through an in-process bus
//!   and new-message toasts plus desktop notifications
//!
//! Everything talks to a [`levely_store::LevelyStore`]. Components return an
//! unbounded event receiver next to themselves for the UI to drain.

pub mod attachments;
pub mod channel;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod notify;

pub use attachments::{validate_image, validate_video, MediaFile};
pub use channel::{ChannelState, MessageChannel};
pub use config::MessagingConfig;
pub use directory::{badge_label, ConversationDirectory, ConversationSummary, DirectoryState};
pub use error::{MessagingError, Result};
pub use events::{ChannelEvent, DirectoryEvent, TypingSignal};
pub use notify::{
    AppEvent, DesktopNotification, DesktopNotifier, MessageNotifier, NotificationBus,
    NotificationCenter, Overlay, OverlayEvent, Permission, Toast, ToastKind, TracingNotifier,
};
