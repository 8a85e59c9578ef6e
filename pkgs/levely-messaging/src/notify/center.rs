use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::bus::{BusSubscription, NotificationBus};
use super::overlay::{Overlay, ToastKind};

/// Renders bus events onto the overlay while mounted
pub struct NotificationCenter {
    task: Option<JoinHandle<()>>,
}

impl NotificationCenter {
    /// Start listening. Only events published after this call are shown.
    pub fn mount(bus: &NotificationBus, overlay: Overlay) -> Self {
        let subscription = bus.subscribe();
        let task = tokio::spawn(run(subscription, overlay));
        info!("Notification center mounted");
        Self { task: Some(task) }
    }

    pub fn is_mounted(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop listening and wait for the subscription to be released.
    pub async fn unmount(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            info!("Notification center unmounted");
        }
    }
}

impl Drop for NotificationCenter {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(mut subscription: BusSubscription, overlay: Overlay) {
    loop {
        let deadline = overlay.next_deadline();
        let expiry = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => {
                    overlay.show(ToastKind::from(event));
                }
                None => {
                    debug!("Notification bus closed");
                    break;
                }
            },
            _ = expiry => {
                overlay.expire(Instant::now());
            }
            // Something else showed or dismissed an entry; recompute the deadline
            _ = overlay.changed() => {}
        }
    }
}
