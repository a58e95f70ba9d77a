//! In-memory notification outbox.
//!
//! Append-only: the engine writes, nothing in the engine ever reads back.
//! Tests and the demo daemon inspect it through [`InMemoryNotificationOutbox::delivered`].

use crate::domain::entities::{EntityId, Notification};
use crate::ports::outbound::NotificationSink;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

/// Collects notifications in memory, in delivery order.
#[derive(Default)]
pub struct InMemoryNotificationOutbox {
    entries: Mutex<Vec<Notification>>,
    next_id: AtomicI64,
}

impl InMemoryNotificationOutbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in order.
    pub fn delivered(&self) -> Vec<Notification> {
        self.entries.lock().clone()
    }

    /// Number of notifications delivered so far.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing has been delivered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl NotificationSink for InMemoryNotificationOutbox {
    fn deliver(&self, mut notification: Notification) {
        let id: EntityId = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        notification.id = id;
        debug!(
            notification_id = id,
            user_id = notification.user_id,
            kind = ?notification.kind,
            "notification delivered to outbox"
        );
        self.entries.lock().push(notification);
    }
}
