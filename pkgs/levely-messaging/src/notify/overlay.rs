//! On-screen stack of toasts and modals
//!
//! Entries carry a deadline on the runtime clock. Renderers ask for
//! [`Overlay::visible_at`]; [`Overlay::expire`] drops what has run out and a
//! mounted notification center calls it when the next deadline passes.

use futures::channel::mpsc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use super::bus::AppEvent;
use crate::config::MessagingConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum ToastKind {
    Xp {
        amount: u32,
        reason: String,
    },
    /// Rendered as a full-screen modal
    Achievement {
        title: String,
        description: String,
        icon: String,
        xp_reward: u32,
    },
    Message {
        conversation_id: String,
        sender_name: String,
        avatar_url: Option<String>,
        preview: String,
    },
}

impl From<AppEvent> for ToastKind {
    fn from(event: AppEvent) -> Self {
        match event {
            AppEvent::XpGained { amount, reason } => ToastKind::Xp { amount, reason },
            AppEvent::AchievementUnlocked {
                title,
                description,
                icon,
                xp_reward,
            } => ToastKind::Achievement {
                title,
                description,
                icon,
                xp_reward,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub id: u64,
    pub kind: ToastKind,
    pub shown_at: Instant,
    pub expires_at: Instant,
}

impl Toast {
    pub fn is_visible_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayEvent {
    Shown(Toast),
    Dismissed { id: u64 },
}

#[derive(Default)]
struct OverlayInner {
    next_id: u64,
    toasts: Vec<Toast>,
    listeners: Vec<mpsc::UnboundedSender<OverlayEvent>>,
}

impl OverlayInner {
    fn emit(&mut self, event: OverlayEvent) {
        self.listeners
            .retain(|listener| listener.unbounded_send(event.clone()).is_ok());
    }
}

/// Shared overlay state; clones refer to the same stack
#[derive(Clone)]
pub struct Overlay {
    config: Arc<MessagingConfig>,
    inner: Arc<Mutex<OverlayInner>>,
    changed: Arc<Notify>,
}

impl Overlay {
    pub fn new(config: Arc<MessagingConfig>) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(OverlayInner::default())),
            changed: Arc::new(Notify::new()),
        }
    }

    /// Resolves after the next `show` or `dismiss` on any clone of this overlay.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    /// Receive `Shown`/`Dismissed` events from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<OverlayEvent> {
        let (sender, receiver) = mpsc::unbounded();
        self.inner.lock().listeners.push(sender);
        receiver
    }

    pub fn lifetime(&self, kind: &ToastKind) -> Duration {
        match kind {
            ToastKind::Xp { .. } => self.config.xp_toast(),
            ToastKind::Achievement { .. } => self.config.achievement_modal(),
            ToastKind::Message { .. } => self.config.message_toast(),
        }
    }

    pub fn show(&self, kind: ToastKind) -> Toast {
        self.show_at(kind, Instant::now())
    }

    /// Push an entry on top of the stack, shown from `now`.
    pub fn show_at(&self, kind: ToastKind, now: Instant) -> Toast {
        let lifetime = self.lifetime(&kind);
        let toast = {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let toast = Toast {
                id: inner.next_id,
                kind,
                shown_at: now,
                expires_at: now + lifetime,
            };
            debug!("Showing toast {} for {:?}", toast.id, lifetime);
            inner.toasts.push(toast.clone());
            inner.emit(OverlayEvent::Shown(toast.clone()));
            toast
        };
        self.changed.notify_one();
        toast
    }

    /// Remove an entry before its deadline. Returns false if it was already gone.
    pub fn dismiss(&self, id: u64) -> bool {
        {
            let mut inner = self.inner.lock();
            let Some(pos) = inner.toasts.iter().position(|t| t.id == id) else {
                return false;
            };
            inner.toasts.remove(pos);
            inner.emit(OverlayEvent::Dismissed { id });
        }
        self.changed.notify_one();
        true
    }

    /// Entries still on screen at `now`, oldest first
    pub fn visible_at(&self, now: Instant) -> Vec<Toast> {
        self.inner
            .lock()
            .toasts
            .iter()
            .filter(|t| t.is_visible_at(now))
            .cloned()
            .collect()
    }

    pub fn visible(&self) -> Vec<Toast> {
        self.visible_at(Instant::now())
    }

    /// Drop every entry past its deadline; returns the removed ids.
    pub fn expire(&self, now: Instant) -> Vec<u64> {
        let mut inner = self.inner.lock();
        let (expired, kept): (Vec<Toast>, Vec<Toast>) = inner
            .toasts
            .drain(..)
            .partition(|t| !t.is_visible_at(now));
        inner.toasts = kept;

        let ids: Vec<u64> = expired.iter().map(|t| t.id).collect();
        for id in &ids {
            inner.emit(OverlayEvent::Dismissed { id: *id });
        }
        ids
    }

    /// Earliest deadline among the entries still held
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.lock().toasts.iter().map(|t| t.expires_at).min()
    }
}
