//! Pump task applying feed changes and typing signals to a channel

use futures::channel::mpsc;
use levely_store::{
    BroadcastEnvelope, BroadcastSubscription, ChangeKind, FeedSubscription, MessageChange,
    MessageStore,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::message_channel::ChannelInner;
use super::ChannelState;
use crate::events::{ChannelEvent, TypingSignal};

pub(super) struct ChannelEventHandler {
    pub(super) conversation_id: String,
    pub(super) viewer_id: String,
    pub(super) messages: MessageStore,
    pub(super) inner: Arc<Mutex<ChannelInner>>,
    pub(super) event_sender: mpsc::UnboundedSender<ChannelEvent>,
}

impl ChannelEventHandler {
    pub(super) async fn run(self, mut feed: FeedSubscription, mut typing: BroadcastSubscription) {
        let mut typing_open = true;

        loop {
            tokio::select! {
                change = feed.recv() => match change {
                    Some(change) => self.handle_change(change).await,
                    None => {
                        info!("Change feed closed for conversation {}", self.conversation_id);
                        self.send_event(ChannelEvent::FeedClosed);
                        break;
                    }
                },
                envelope = typing.recv(), if typing_open => match envelope {
                    Some(envelope) => self.handle_typing(envelope),
                    None => {
                        debug!("Typing channel closed for conversation {}", self.conversation_id);
                        typing_open = false;
                    }
                },
            }
        }
    }

    async fn handle_change(&self, change: MessageChange) {
        match change.kind {
            ChangeKind::Insert => self.handle_insert(change).await,
            ChangeKind::Update => self.handle_update(change),
        }
    }

    async fn handle_insert(&self, change: MessageChange) {
        let message = change.new;
        let appended = {
            let mut inner = self.inner.lock();
            if inner.state == ChannelState::Closed {
                return;
            }
            inner.typing.clear(&message.sender_id);
            inner.history.insert(message.clone())
        };

        if !appended {
            debug!("Message {} already in history", message.id);
            return;
        }

        let addressed_to_viewer =
            message.receiver_id == self.viewer_id && message.sender_id != self.viewer_id;
        self.send_event(ChannelEvent::MessageAppended(message));

        if addressed_to_viewer {
            match self
                .messages
                .mark_read(&self.conversation_id, &self.viewer_id)
                .await
            {
                Ok(0) => {}
                Ok(count) => self.send_event(ChannelEvent::MarkedRead { count }),
                Err(e) => warn!("Failed to mark messages as read: {}", e),
            }
        }
    }

    fn handle_update(&self, change: MessageChange) {
        let message = change.new;
        let event = {
            let mut inner = self.inner.lock();
            if inner.state == ChannelState::Closed {
                return;
            }
            if message.is_deleted() {
                inner
                    .history
                    .remove(&message.id)
                    .map(|removed| ChannelEvent::MessageRemoved { id: removed.id })
            } else {
                inner.history.update(message).map(ChannelEvent::MessageUpdated)
            }
        };

        if let Some(event) = event {
            self.send_event(event);
        }
    }

    fn handle_typing(&self, envelope: BroadcastEnvelope) {
        let signal: TypingSignal = match serde_json::from_value(envelope.payload) {
            Ok(signal) => signal,
            Err(e) => {
                warn!("Ignoring malformed typing signal: {}", e);
                return;
            }
        };

        if signal.user_id == self.viewer_id || signal.conversation_id != self.conversation_id {
            return;
        }

        {
            let mut inner = self.inner.lock();
            if inner.state == ChannelState::Closed {
                return;
            }
            inner.typing.touch(&signal.user_id, Instant::now());
        }
        self.send_event(ChannelEvent::Typing {
            user_id: signal.user_id,
        });
    }

    fn send_event(&self, event: ChannelEvent) {
        // The receiver may already be gone
        let _ = self.event_sender.unbounded_send(event);
    }
}
