//! Toast notifications.
//!
//! Each session gets its own [`Notifier`]: an insertion-ordered queue of short
//! messages that expire on their own after a fixed delay. Handlers push to it
//! through the session context; the browser overlay polls `GET /api/v1/toasts`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Toast {
    pub id: u64,
    pub message: String,
    pub kind: ToastKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Queue {
    toasts: Vec<Toast>,
    last_id: u64,
}

pub struct Notifier {
    queue: Arc<Mutex<Queue>>,
    ttl: Duration,
}

fn lock(queue: &Mutex<Queue>) -> MutexGuard<'_, Queue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Notifier {
    pub fn new(ttl: Duration) -> Self {
        Self {
            queue: Arc::new(Mutex::new(Queue::default())),
            ttl,
        }
    }

    /// Append a toast and schedule its removal after the configured delay.
    pub fn show(&self, message: impl Into<String>, kind: ToastKind) -> u64 {
        let created_at = Utc::now();
        let id = {
            let mut q = lock(&self.queue);
            // millisecond timestamp, bumped so ids stay unique within the queue
            let id = (created_at.timestamp_millis().max(0) as u64).max(q.last_id + 1);
            q.last_id = id;
            q.toasts.push(Toast {
                id,
                message: message.into(),
                kind,
                created_at,
            });
            id
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let queue: Weak<Mutex<Queue>> = Arc::downgrade(&self.queue);
                let ttl = self.ttl;
                handle.spawn(async move {
                    tokio::time::sleep(ttl).await;
                    if let Some(queue) = queue.upgrade() {
                        lock(&queue).toasts.retain(|t| t.id != id);
                    }
                });
            }
            Err(_) => tracing::warn!(id, "no runtime; toast will not expire on its own"),
        }
        id
    }

    pub fn success(&self, message: impl Into<String>) -> u64 {
        self.show(message, ToastKind::Success)
    }

    pub fn error(&self, message: impl Into<String>) -> u64 {
        self.show(message, ToastKind::Error)
    }

    /// Remove a toast before it expires. Returns whether it was still present.
    pub fn dismiss(&self, id: u64) -> bool {
        let mut q = lock(&self.queue);
        let before = q.toasts.len();
        q.toasts.retain(|t| t.id != id);
        q.toasts.len() != before
    }

    pub fn list(&self) -> Vec<Toast> {
        lock(&self.queue).toasts.clone()
    }
}

/// Per-session notifiers, created on first use and dropped on logout.
pub struct ToastHub {
    ttl: Duration,
    notifiers: Mutex<HashMap<Uuid, Arc<Notifier>>>,
}

impl ToastHub {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            notifiers: Mutex::new(HashMap::new()),
        }
    }

    pub fn for_session(&self, session_id: Uuid) -> Arc<Notifier> {
        let mut map = self.notifiers.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(session_id)
            .or_insert_with(|| Arc::new(Notifier::new(self.ttl)))
            .clone()
    }

    pub fn drop_session(&self, session_id: Uuid) {
        self.notifiers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session_id);
    }

    #[cfg(test)]
    pub(crate) fn queue_count(&self) -> usize {
        self.notifiers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
