//! Toasts and desktop notifications for messages received elsewhere in the app

use levely_store::{ChangeKind, FeedFilter, FeedSubscription, LevelyStore, Message};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::desktop::{DesktopNotification, DesktopNotifier, Permission};
use super::overlay::{Overlay, ToastKind};
use crate::config::MessagingConfig;

pub struct MessageNotifier {
    viewing_messages: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct NotifierContext {
    store: LevelyStore,
    config: Arc<MessagingConfig>,
    desktop: Arc<dyn DesktopNotifier>,
    overlay: Overlay,
    viewer_id: String,
    viewing_messages: Arc<AtomicBool>,
}

impl MessageNotifier {
    /// Start watching inserts addressed to `viewer_id`.
    ///
    /// Desktop permission is requested here if it has never been asked.
    pub async fn start(
        store: LevelyStore,
        config: Arc<MessagingConfig>,
        desktop: Arc<dyn DesktopNotifier>,
        overlay: Overlay,
        viewer_id: &str,
    ) -> Self {
        let feed = store
            .feed()
            .subscribe(FeedFilter::Receiver(viewer_id.to_string()), &[ChangeKind::Insert]);

        if desktop.permission() == Permission::Default {
            let permission = desktop.request_permission().await;
            info!("Desktop notification permission: {:?}", permission);
        }

        let viewing_messages = Arc::new(AtomicBool::new(false));
        let context = NotifierContext {
            store,
            config,
            desktop,
            overlay,
            viewer_id: viewer_id.to_string(),
            viewing_messages: viewing_messages.clone(),
        };
        let task = tokio::spawn(context.run(feed));

        Self {
            viewing_messages,
            task: Mutex::new(Some(task)),
        }
    }

    /// While set, incoming messages raise nothing
    pub fn set_viewing_messages(&self, viewing: bool) {
        self.viewing_messages.store(viewing, Ordering::SeqCst);
    }

    pub fn is_viewing_messages(&self) -> bool {
        self.viewing_messages.load(Ordering::SeqCst)
    }

    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for MessageNotifier {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl NotifierContext {
    async fn run(self, mut feed: FeedSubscription) {
        while let Some(change) = feed.recv().await {
            self.notify(change.new).await;
        }
        debug!("Message notifier for {} stopped", self.viewer_id);
    }

    async fn notify(&self, message: Message) {
        if self.viewing_messages.load(Ordering::SeqCst) || message.sender_id == self.viewer_id {
            return;
        }

        let sender = match self.store.profiles().get(&message.sender_id).await {
            Ok(Some(sender)) => sender,
            Ok(None) => {
                warn!("No profile for sender {}", message.sender_id);
                return;
            }
            Err(e) => {
                warn!("Failed to load sender {}: {}", message.sender_id, e);
                return;
            }
        };

        let preview = message.preview().unwrap_or_default().to_string();

        if self.desktop.permission() == Permission::Granted {
            self.desktop.show(DesktopNotification {
                title: format!("New message from {}", sender.username),
                body: preview.clone(),
                icon: sender
                    .avatar_url
                    .clone()
                    .unwrap_or_else(|| self.config.default_avatar.clone()),
                tag: message.conversation_id.clone(),
            });
        }

        self.overlay.show(ToastKind::Message {
            conversation_id: message.conversation_id,
            sender_name: sender.username,
            avatar_url: sender.avatar_url,
            preview,
        });
    }
}
