//! A live view of one conversation
//!
//! [`MessageChannel`] loads the history, keeps it current from the change
//! feed, marks incoming messages read and exchanges typing signals with the
//! counterpart. UI updates come out of the receiver returned by
//! [`MessageChannel::open`].

mod event_handler;
mod history;
mod message_channel;
mod typing;

pub use history::History;
pub use message_channel::MessageChannel;
pub use typing::TypingTracker;

/// Lifecycle of a message channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// History is being fetched
    Loading,
    Ready,
    /// A text send is in flight
    Sending,
    Closed,
}
