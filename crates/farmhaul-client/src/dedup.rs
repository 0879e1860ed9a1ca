//! Bounded memory of recently seen event ids.

use farmhaul_core::EventId;
use std::collections::{HashSet, VecDeque};

pub(crate) struct RecentIds {
    capacity: usize,
    order: VecDeque<EventId>,
    seen: HashSet<EventId>,
}

impl RecentIds {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Remember `id`. Returns false if it was already in the window.
    /// A zero capacity remembers nothing and accepts everything.
    pub(crate) fn insert(&mut self, id: &EventId) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if !self.seen.insert(id.clone()) {
            return false;
        }
        self.order.push_back(id.clone());
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    pub(crate) fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}
