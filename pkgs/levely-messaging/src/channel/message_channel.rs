use futures::channel::mpsc;
use levely_store::{ChangeKind, Conversation, FeedFilter, LevelyStore, Message, NewMessage, Profile};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::event_handler::ChannelEventHandler;
use super::{ChannelState, History, TypingTracker};
use crate::attachments::{object_key, validate_image, MediaFile};
use crate::config::MessagingConfig;
use crate::error::{MessagingError, Result};
use crate::events::{typing_channel, ChannelEvent, TypingSignal, TYPING_EVENT};

pub(super) struct ChannelInner {
    pub(super) state: ChannelState,
    pub(super) history: History,
    pub(super) typing: TypingTracker,
    draft: String,
    uploading: bool,
    last_typing_sent: Option<Instant>,
}

/// Live view of one conversation for one viewer
pub struct MessageChannel {
    store: LevelyStore,
    config: Arc<MessagingConfig>,
    conversation: Conversation,
    viewer_id: String,
    counterpart_id: String,
    counterpart: Option<Profile>,
    inner: Arc<Mutex<ChannelInner>>,
    event_sender: mpsc::UnboundedSender<ChannelEvent>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl MessageChannel {
    /// Open a conversation for `viewer_id`.
    ///
    /// Subscribes to the change feed and the typing channel before the
    /// history is fetched, so a message committed while loading is either in
    /// the snapshot or delivered by the feed. Incoming unread messages are
    /// marked read once the history is in place.
    #[instrument(skip(store, config))]
    pub async fn open(
        store: LevelyStore,
        config: Arc<MessagingConfig>,
        conversation_id: &str,
        viewer_id: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChannelEvent>)> {
        let conversation = store.conversations().require(conversation_id).await?;
        let counterpart_id = conversation
            .counterpart_of(viewer_id)
            .ok_or_else(|| MessagingError::NotParticipant(viewer_id.to_string()))?
            .to_string();

        let feed = store.feed().subscribe(
            FeedFilter::Conversation(conversation.id.clone()),
            &[ChangeKind::Insert, ChangeKind::Update],
        );
        let typing = store
            .broadcast()
            .subscribe(&typing_channel(&conversation.id), TYPING_EVENT);

        let counterpart = match store.profiles().get(&counterpart_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Failed to load profile {}: {}", counterpart_id, e);
                None
            }
        };

        let inner = Arc::new(Mutex::new(ChannelInner {
            state: ChannelState::Loading,
            history: History::default(),
            typing: TypingTracker::new(config.typing_window()),
            draft: String::new(),
            uploading: false,
            last_typing_sent: None,
        }));

        let snapshot = store.messages().history(&conversation.id).await.map_err(|e| {
            error!("Failed to load messages for {}: {}", conversation.id, e);
            e
        })?;
        let loaded = snapshot.len();
        {
            let mut guard = inner.lock();
            guard.history = History::from_snapshot(snapshot);
            guard.state = ChannelState::Ready;
        }

        let (event_sender, event_receiver) = mpsc::unbounded();

        match store.messages().mark_read(&conversation.id, viewer_id).await {
            Ok(0) => {}
            Ok(count) => {
                let _ = event_sender.unbounded_send(ChannelEvent::MarkedRead { count });
            }
            Err(e) => warn!("Failed to mark messages as read: {}", e),
        }

        let handler = ChannelEventHandler {
            conversation_id: conversation.id.clone(),
            viewer_id: viewer_id.to_string(),
            messages: store.messages(),
            inner: inner.clone(),
            event_sender: event_sender.clone(),
        };
        let pump = tokio::spawn(handler.run(feed, typing));

        info!("Opened conversation {} with {} messages", conversation.id, loaded);

        Ok((
            Self {
                store,
                config,
                conversation,
                viewer_id: viewer_id.to_string(),
                counterpart_id,
                counterpart,
                inner,
                event_sender,
                pump: Mutex::new(Some(pump)),
            },
            event_receiver,
        ))
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn counterpart_id(&self) -> &str {
        &self.counterpart_id
    }

    /// Counterpart profile, if it could be loaded
    pub fn counterpart(&self) -> Option<&Profile> {
        self.counterpart.as_ref()
    }

    pub fn state(&self) -> ChannelState {
        self.inner.lock().state
    }

    /// Visible messages in display order
    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().history.as_slice().to_vec()
    }

    pub fn is_uploading(&self) -> bool {
        self.inner.lock().uploading
    }

    pub fn draft(&self) -> String {
        self.inner.lock().draft.clone()
    }

    /// Replace the composer text and tell the counterpart the viewer is
    /// typing. Broadcasts are throttled; returns whether one went out.
    pub fn update_draft(&self, text: &str) -> bool {
        let now = Instant::now();
        let throttle = self.config.typing_throttle();
        let should_broadcast = {
            let mut inner = self.inner.lock();
            if inner.state == ChannelState::Closed {
                return false;
            }
            inner.draft = text.to_string();
            let due = match inner.last_typing_sent {
                Some(sent) => now.duration_since(sent) >= throttle,
                None => true,
            };
            if due && !text.is_empty() {
                inner.last_typing_sent = Some(now);
            }
            due && !text.is_empty()
        };

        if should_broadcast {
            self.broadcast_typing();
        }
        should_broadcast
    }

    /// Publish a typing signal now, bypassing the throttle.
    pub fn broadcast_typing(&self) -> usize {
        let signal = TypingSignal {
            conversation_id: self.conversation.id.clone(),
            user_id: self.viewer_id.clone(),
        };
        match serde_json::to_value(&signal) {
            Ok(payload) => self.store.broadcast().publish(
                &typing_channel(&self.conversation.id),
                TYPING_EVENT,
                payload,
            ),
            Err(e) => {
                warn!("Failed to encode typing signal: {}", e);
                0
            }
        }
    }

    /// Whether `user_id` has a live typing signal at `now`
    pub fn is_typing_at(&self, user_id: &str, now: Instant) -> bool {
        self.inner.lock().typing.is_typing_at(user_id, now)
    }

    pub fn counterpart_typing(&self) -> bool {
        self.is_typing_at(&self.counterpart_id, Instant::now())
    }

    pub fn typing_users(&self) -> Vec<String> {
        self.inner.lock().typing.typing_at(Instant::now())
    }

    /// Send a text message to the counterpart.
    ///
    /// The message is not added locally; it shows up when the feed delivers
    /// the insert. On failure the text goes back into the draft.
    pub async fn send(&self, content: &str) -> Result<Message> {
        let text = content.trim();
        if text.is_empty() {
            return Err(MessagingError::EmptyMessage);
        }

        {
            let mut inner = self.inner.lock();
            match inner.state {
                ChannelState::Ready => inner.state = ChannelState::Sending,
                ChannelState::Sending => return Err(MessagingError::SendInFlight),
                other => return Err(MessagingError::NotReady(other)),
            }
            inner.draft.clear();
        }
        let _sending = SendingGuard { inner: &self.inner };

        let new_message = NewMessage::text(
            &self.conversation.id,
            &self.viewer_id,
            &self.counterpart_id,
            text,
        );

        match self.store.messages().insert(new_message).await {
            Ok(message) => {
                debug!("Sent message {} to {}", message.id, self.counterpart_id);
                Ok(message)
            }
            Err(e) => {
                error!("Failed to send message: {}", e);
                self.inner.lock().draft = content.to_string();
                Err(e.into())
            }
        }
    }

    /// Send whatever is currently in the draft
    pub async fn send_draft(&self) -> Result<Message> {
        let draft = self.draft();
        self.send(&draft).await
    }

    /// Upload an image and send it as an image message.
    ///
    /// If the upload succeeds but the message insert fails, the uploaded
    /// object is removed again.
    pub async fn attach_image(&self, file: MediaFile) -> Result<Message> {
        let content_type = validate_image(&file, self.config.max_image_bytes)?;

        {
            let mut inner = self.inner.lock();
            match inner.state {
                ChannelState::Ready | ChannelState::Sending => {}
                other => return Err(MessagingError::NotReady(other)),
            }
            if inner.uploading {
                return Err(MessagingError::UploadInFlight);
            }
            inner.uploading = true;
        }
        let _uploading = UploadGuard { inner: &self.inner };

        let bucket = self.config.image_bucket.as_str();
        let key = object_key(&self.viewer_id, &file);
        let storage = self.store.storage();

        let stored = storage
            .upload(bucket, &key, &file.bytes, &content_type)
            .await
            .map_err(|e| {
                error!("Failed to upload image: {}", e);
                e
            })?;
        let image_url = storage.public_url(&stored.bucket, &stored.path);

        let new_message = NewMessage {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: self.conversation.id.clone(),
            sender_id: self.viewer_id.clone(),
            receiver_id: self.counterpart_id.clone(),
            content: Some(self.config.image_placeholder.clone()),
            image_url: Some(image_url),
        };

        match self.store.messages().insert(new_message).await {
            Ok(message) => {
                info!("Sent image {}/{}", stored.bucket, stored.path);
                Ok(message)
            }
            Err(e) => {
                error!("Failed to send image message: {}", e);
                if let Err(cleanup) = storage.remove(&stored.bucket, &stored.path).await {
                    warn!("Failed to remove orphaned upload {}: {}", stored.path, cleanup);
                }
                Err(e.into())
            }
        }
    }

    /// Soft-delete one of the viewer's own messages.
    ///
    /// `confirm` is asked before anything is written; returning false cancels.
    /// The message leaves the local history right away.
    pub async fn delete_message<F>(&self, message_id: &str, confirm: F) -> Result<()>
    where
        F: FnOnce(&Message) -> bool,
    {
        let local = self.inner.lock().history.get(message_id).cloned();
        let message = match local {
            Some(message) => message,
            None => self
                .store
                .messages()
                .get(message_id)
                .await?
                .ok_or_else(|| levely_store::StoreError::MessageNotFound(message_id.to_string()))?,
        };

        if message.conversation_id != self.conversation.id {
            return Err(levely_store::StoreError::MessageNotFound(message_id.to_string()).into());
        }
        if message.sender_id != self.viewer_id {
            return Err(MessagingError::NotSender);
        }
        if !confirm(&message) {
            return Err(MessagingError::DeleteCancelled);
        }

        if let Err(e) = self
            .store
            .messages()
            .soft_delete(message_id, &self.viewer_id)
            .await
        {
            error!("Failed to delete message {}: {}", message_id, e);
            return Err(e.into());
        }

        let removed = self.inner.lock().history.remove(message_id);
        if removed.is_some() {
            let _ = self.event_sender.unbounded_send(ChannelEvent::MessageRemoved {
                id: message_id.to_string(),
            });
        }
        Ok(())
    }

    /// Stop live updates and wait for the pump task to release its
    /// subscriptions. Safe to call more than once.
    pub async fn close(&self) {
        let pump = self.shutdown();
        if let Some(pump) = pump {
            // Cancelled is the expected outcome
            let _ = pump.await;
            info!("Closed conversation {}", self.conversation.id);
        }
    }

    fn shutdown(&self) -> Option<JoinHandle<()>> {
        {
            let mut inner = self.inner.lock();
            inner.state = ChannelState::Closed;
            inner.typing.clear_all();
        }
        let pump = self.pump.lock().take();
        if let Some(pump) = &pump {
            pump.abort();
        }
        pump
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Returns the channel to `Ready` when a send finishes, fails or is dropped.
struct SendingGuard<'a> {
    inner: &'a Mutex<ChannelInner>,
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if inner.state == ChannelState::Sending {
            inner.state = ChannelState::Ready;
        }
    }
}

struct UploadGuard<'a> {
    inner: &'a Mutex<ChannelInner>,
}

impl Drop for UploadGuard<'_> {
    fn drop(&mut self) {
        self.inner.lock().uploading = false;
    }
}
