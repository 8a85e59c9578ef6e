//! Seam for OS-level notifications

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    /// Not asked yet
    Default,
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesktopNotification {
    pub title: String,
    pub body: String,
    pub icon: String,
    /// Notifications sharing a tag replace each other
    pub tag: String,
}

#[async_trait]
pub trait DesktopNotifier: Send + Sync {
    fn permission(&self) -> Permission;

    async fn request_permission(&self) -> Permission;

    fn show(&self, notification: DesktopNotification);
}

/// Writes notifications to the log instead of the desktop
pub struct TracingNotifier {
    permission: Mutex<Permission>,
    grant_on_request: bool,
}

impl TracingNotifier {
    pub fn new(grant_on_request: bool) -> Self {
        Self {
            permission: Mutex::new(Permission::Default),
            grant_on_request,
        }
    }
}

#[async_trait]
impl DesktopNotifier for TracingNotifier {
    fn permission(&self) -> Permission {
        *self.permission.lock()
    }

    async fn request_permission(&self) -> Permission {
        let mut permission = self.permission.lock();
        if *permission == Permission::Default {
            *permission = if self.grant_on_request {
                Permission::Granted
            } else {
                Permission::Denied
            };
        }
        *permission
    }

    fn show(&self, notification: DesktopNotification) {
        info!(
            tag = %notification.tag,
            icon = %notification.icon,
            "{}: {}",
            notification.title,
            notification.body
        );
    }
}
