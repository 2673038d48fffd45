//! Single-slot notification store with automatic expiry.

use crate::types::{Event, Notification, NotificationKind};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Holds at most one visible notification
///
/// A new notification replaces the current one. A notification stops being
/// visible once it is older than the display duration; expiry is checked on
/// read against tokio's clock, so paused-time tests control it.
#[derive(Debug)]
pub struct NotificationCenter {
    slot: Mutex<Option<(Notification, Instant)>>,
    display_duration: Duration,
    event_tx: broadcast::Sender<Event>,
}

impl NotificationCenter {
    /// Create a center that broadcasts every notification on `event_tx`
    pub fn new(display_duration: Duration, event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            slot: Mutex::new(None),
            display_duration,
            event_tx,
        }
    }

    /// Replace the active notification
    pub fn notify(&self, message: impl Into<String>, kind: NotificationKind) -> Notification {
        let notification = Notification {
            message: message.into(),
            kind,
            created_at: chrono::Utc::now(),
        };

        match kind {
            NotificationKind::Success => {
                tracing::info!(message = %notification.message, "notification")
            }
            NotificationKind::Error => {
                tracing::warn!(message = %notification.message, "notification")
            }
        }

        *self.lock() = Some((notification.clone(), Instant::now()));
        // No subscribers is fine
        self.event_tx
            .send(Event::Notified {
                notification: notification.clone(),
            })
            .ok();
        notification
    }

    /// Shorthand for a success notification
    pub fn success(&self, message: impl Into<String>) -> Notification {
        self.notify(message, NotificationKind::Success)
    }

    /// Shorthand for an error notification
    pub fn error(&self, message: impl Into<String>) -> Notification {
        self.notify(message, NotificationKind::Error)
    }

    /// The visible notification, if it has not expired
    pub fn current(&self) -> Option<Notification> {
        let mut slot = self.lock();
        match slot.as_ref() {
            Some((_, shown_at)) if shown_at.elapsed() >= self.display_duration => {
                *slot = None;
                None
            }
            Some((notification, _)) => Some(notification.clone()),
            None => None,
        }
    }

    /// Hide the active notification
    pub fn dismiss(&self) {
        *self.lock() = None;
    }

    /// How long notifications stay visible
    pub fn display_duration(&self) -> Duration {
        self.display_duration
    }

    fn lock(&self) -> MutexGuard<'_, Option<(Notification, Instant)>> {
        // The slot holds plain data, so a poisoned lock is still consistent
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}
