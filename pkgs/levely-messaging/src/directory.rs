//! Conversation list for one viewer
//!
//! Each entry carries the counterpart's profile, the latest visible message
//! and the viewer's unread count. The list is rebuilt in full whenever any
//! message is inserted or updated anywhere.

use futures::channel::mpsc;
use levely_store::{ChangeKind, Conversation, FeedFilter, FeedSubscription, LevelyStore, Message, Profile};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::channel::MessageChannel;
use crate::config::MessagingConfig;
use crate::error::{MessagingError, Result};
use crate::events::{ChannelEvent, DirectoryEvent};

/// One row of the directory
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub counterpart: Profile,
    pub last_message: Option<Message>,
    pub unread_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryState {
    Loading,
    /// Loaded; an empty list means the viewer has no conversations yet
    Ready(Vec<ConversationSummary>),
}

/// Text for an unread badge: nothing for zero, "9+" past nine.
pub fn badge_label(count: u64) -> Option<String> {
    match count {
        0 => None,
        1..=9 => Some(count.to_string()),
        _ => Some("9+".to_string()),
    }
}

struct DirectoryInner {
    state: DirectoryState,
    selected: Option<String>,
    applied_generation: u64,
}

#[derive(Clone)]
struct DirectoryLoader {
    store: LevelyStore,
    viewer_id: String,
    inner: Arc<Mutex<DirectoryInner>>,
    generation: Arc<AtomicU64>,
    event_sender: mpsc::UnboundedSender<DirectoryEvent>,
}

impl DirectoryLoader {
    /// Rebuild the list. Failures are logged and leave an empty list.
    #[instrument(skip(self), fields(viewer = %self.viewer_id))]
    async fn refresh(&self) -> Vec<ConversationSummary> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (summaries, event) = match self.load().await {
            Ok(summaries) => {
                let unread_total = summaries.iter().map(|s| s.unread_count).sum();
                let event = DirectoryEvent::Refreshed {
                    conversations: summaries.len(),
                    unread_total,
                };
                (summaries, event)
            }
            Err(e) => {
                error!("Failed to load conversations: {}", e);
                (Vec::new(), DirectoryEvent::RefreshFailed(e.to_string()))
            }
        };

        {
            let mut inner = self.inner.lock();
            // A slower, older refresh must not overwrite a newer result
            if generation < inner.applied_generation {
                debug!("Discarding stale refresh {}", generation);
                return summaries;
            }
            inner.applied_generation = generation;
            inner.state = DirectoryState::Ready(summaries.clone());
        }

        let _ = self.event_sender.unbounded_send(event);
        summaries
    }

    async fn load(&self) -> levely_store::Result<Vec<ConversationSummary>> {
        let viewer = self.viewer_id.as_str();
        let conversations = self.store.conversations().list_for_user(viewer).await?;
        if conversations.is_empty() {
            return Ok(Vec::new());
        }

        let conversation_ids: Vec<String> =
            conversations.iter().map(|c| c.id.clone()).collect();
        let mut counterpart_ids: Vec<String> = conversations
            .iter()
            .filter_map(|c| c.counterpart_of(viewer).map(str::to_string))
            .collect();
        counterpart_ids.sort();
        counterpart_ids.dedup();

        let profiles: HashMap<String, Profile> = self
            .store
            .profiles()
            .get_many(&counterpart_ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        let mut latest = self
            .store
            .messages()
            .latest_per_conversation(&conversation_ids)
            .await?;
        let unread = self
            .store
            .messages()
            .unread_counts(viewer, &conversation_ids)
            .await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let Some(counterpart_id) = conversation.counterpart_of(viewer) else {
                continue;
            };
            let Some(counterpart) = profiles.get(counterpart_id).cloned() else {
                warn!(
                    "Skipping conversation {}: no profile for {}",
                    conversation.id, counterpart_id
                );
                continue;
            };
            let last_message = latest.remove(&conversation.id);
            let unread_count = unread.get(&conversation.id).copied().unwrap_or(0);
            summaries.push(ConversationSummary {
                conversation,
                counterpart,
                last_message,
                unread_count,
            });
        }

        Ok(summaries)
    }

    async fn watch(self, mut feed: FeedSubscription) {
        while feed.recv().await.is_some() {
            self.refresh().await;
        }
        info!("Change feed closed; directory for {} stops refreshing", self.viewer_id);
        let _ = self.event_sender.unbounded_send(DirectoryEvent::FeedClosed);
    }
}

/// Live conversation list for one viewer
pub struct ConversationDirectory {
    loader: DirectoryLoader,
    config: Arc<MessagingConfig>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ConversationDirectory {
    /// Load the list for `viewer_id` and start following the global feed.
    pub async fn open(
        store: LevelyStore,
        config: Arc<MessagingConfig>,
        viewer_id: &str,
    ) -> (Self, mpsc::UnboundedReceiver<DirectoryEvent>) {
        let (event_sender, event_receiver) = mpsc::unbounded();

        let feed = store
            .feed()
            .subscribe(FeedFilter::All, &[ChangeKind::Insert, ChangeKind::Update]);

        let loader = DirectoryLoader {
            store,
            viewer_id: viewer_id.to_string(),
            inner: Arc::new(Mutex::new(DirectoryInner {
                state: DirectoryState::Loading,
                selected: None,
                applied_generation: 0,
            })),
            generation: Arc::new(AtomicU64::new(0)),
            event_sender,
        };

        loader.refresh().await;
        let watcher = tokio::spawn(loader.clone().watch(feed));

        (
            Self {
                loader,
                config,
                watcher: Mutex::new(Some(watcher)),
            },
            event_receiver,
        )
    }

    pub fn viewer_id(&self) -> &str {
        &self.loader.viewer_id
    }

    pub fn state(&self) -> DirectoryState {
        self.loader.inner.lock().state.clone()
    }

    /// Current entries; empty while loading
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        match &self.loader.inner.lock().state {
            DirectoryState::Loading => Vec::new(),
            DirectoryState::Ready(summaries) => summaries.clone(),
        }
    }

    pub fn summary(&self, conversation_id: &str) -> Option<ConversationSummary> {
        self.conversations()
            .into_iter()
            .find(|s| s.conversation.id == conversation_id)
    }

    /// Re-run the full listing now
    pub async fn refresh(&self) -> Vec<ConversationSummary> {
        self.loader.refresh().await
    }

    pub fn selected(&self) -> Option<String> {
        self.loader.inner.lock().selected.clone()
    }

    /// Highlight a conversation and open a channel on it.
    pub async fn select(
        &self,
        conversation_id: &str,
    ) -> Result<(MessageChannel, mpsc::UnboundedReceiver<ChannelEvent>)> {
        self.loader.inner.lock().selected = Some(conversation_id.to_string());
        MessageChannel::open(
            self.loader.store.clone(),
            self.config.clone(),
            conversation_id,
            &self.loader.viewer_id,
        )
        .await
    }

    /// Get or create the conversation with `other_user`.
    pub async fn start_conversation(&self, other_user: &str) -> Result<Conversation> {
        if other_user == self.loader.viewer_id {
            return Err(MessagingError::NotParticipant(other_user.to_string()));
        }
        let conversation = self
            .loader
            .store
            .conversations()
            .get_or_create(&self.loader.viewer_id, other_user)
            .await?;
        debug!("Conversation {} ready with {}", conversation.id, other_user);
        Ok(conversation)
    }

    /// Unread messages addressed to the viewer across every conversation
    pub async fn total_unread(&self) -> Result<u64> {
        Ok(self
            .loader
            .store
            .messages()
            .unread_total(&self.loader.viewer_id)
            .await?)
    }

    /// Stop following the feed. Safe to call more than once.
    pub async fn close(&self) {
        let watcher = self.watcher.lock().take();
        if let Some(watcher) = watcher {
            watcher.abort();
            let _ = watcher.await;
        }
    }
}

impl Drop for ConversationDirectory {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
    }
}
