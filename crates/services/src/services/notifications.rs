use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

/// A transient message for the user. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    /// How long the notification stays visible; 0 keeps it until dismissed.
    pub ttl_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.ttl_ms == 0 {
            return false;
        }
        let ttl = chrono::Duration::milliseconds(i64::try_from(self.ttl_ms).unwrap_or(i64::MAX));
        now - self.created_at >= ttl
    }
}

/// In-memory, append-only notification list. Expired entries are pruned
/// whenever the list is read or written.
#[derive(Clone)]
pub struct NotificationQueue {
    entries: Arc<Mutex<Vec<Notification>>>,
    ttl: Duration,
}

impl NotificationQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.entries.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn push(&self, kind: NotificationKind, message: impl Into<String>) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            ttl_ms: u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX),
            created_at: Utc::now(),
        };
        let mut entries = self.lock();
        prune(&mut entries, notification.created_at);
        entries.push(notification.clone());
        notification
    }

    /// Returns whether a notification was removed.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|notification| notification.id != id);
        entries.len() != before
    }

    /// Live notifications, oldest first.
    pub fn list(&self) -> Vec<Notification> {
        let mut entries = self.lock();
        prune(&mut entries, Utc::now());
        entries.clone()
    }

    pub fn prune_expired(&self) -> usize {
        prune(&mut self.lock(), Utc::now())
    }
}

fn prune(entries: &mut Vec<Notification>, now: DateTime<Utc>) -> usize {
    let before = entries.len();
    entries.retain(|notification| !notification.is_expired(now));
    let removed = before - entries.len();
    if removed > 0 {
        tracing::debug!("Removed {removed} expired notifications");
    }
    removed
}
