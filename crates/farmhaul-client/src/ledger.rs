//! Unread notification ledger.

use crate::api::{ApiError, NotificationApi};
use crate::lock;
use farmhaul_core::{EventId, NotificationEvent};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Default)]
struct LedgerState {
    unread: u64,
    /// Newest first.
    recent: VecDeque<NotificationEvent>,
}

/// Unread counter plus a bounded history of recent notifications.
///
/// The server count is the source of truth; pushed events adjust it
/// locally between refreshes.
pub struct UnreadLedger {
    capacity: usize,
    state: Mutex<LedgerState>,
}

impl UnreadLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn unread_count(&self) -> u64 {
        lock(&self.state).unread
    }

    /// Recent notifications, newest first.
    pub fn recent(&self) -> Vec<NotificationEvent> {
        lock(&self.state).recent.iter().cloned().collect()
    }

    /// Replace the local count with the server's. On failure the previous
    /// count stays.
    pub async fn refresh<A: NotificationApi>(&self, api: &A) -> Result<u64, ApiError> {
        match api.get_unread_notification_count().await {
            Ok(count) => {
                lock(&self.state).unread = count;
                tracing::debug!("Unread count refreshed to {}", count);
                Ok(count)
            }
            Err(e) => {
                tracing::warn!("Unread count refresh failed: {}", e);
                Err(e)
            }
        }
    }

    /// Account for a pushed event. Does not de-duplicate; callers must not
    /// feed the same event twice.
    pub fn record_incoming(&self, event: &NotificationEvent) {
        let mut state = lock(&self.state);
        if !event.is_read {
            state.unread += 1;
        }
        state.recent.push_front(event.clone());
        state.recent.truncate(self.capacity);
    }

    /// Acknowledge one event. Returns false if it is not in the recent
    /// history or was already read.
    pub fn mark_read(&self, id: &EventId) -> bool {
        let mut state = lock(&self.state);
        let Some(event) = state.recent.iter_mut().find(|e| &e.id == id && !e.is_read) else {
            return false;
        };
        event.is_read = true;
        state.unread = state.unread.saturating_sub(1);
        true
    }

    pub fn mark_all_read(&self) {
        let mut state = lock(&self.state);
        state.unread = 0;
        for event in state.recent.iter_mut() {
            event.is_read = true;
        }
    }

    /// Forget everything. Used at logout.
    pub fn clear(&self) {
        *lock(&self.state) = LedgerState::default();
    }
}
