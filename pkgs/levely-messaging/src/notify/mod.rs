//! In-process notifications
//!
//! Producers publish [`AppEvent`]s on a [`NotificationBus`]; a mounted
//! [`NotificationCenter`] turns them into entries on the shared [`Overlay`].
//! [`MessageNotifier`] watches the viewer's incoming messages directly and
//! raises toasts plus desktop notifications while the viewer is elsewhere.

mod bus;
mod center;
mod desktop;
mod message_notifier;
mod overlay;

pub use bus::{AppEvent, BusSubscription, NotificationBus};
pub use center::NotificationCenter;
pub use desktop::{DesktopNotification, DesktopNotifier, Permission, TracingNotifier};
pub use message_notifier::MessageNotifier;
pub use overlay::{Overlay, OverlayEvent, Toast, ToastKind};
