//! Event fan-out to UI collaborators.

use crate::lock;
use farmhaul_core::{EventKind, NotificationEvent, Priority};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// An inbound event as handed to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedEvent {
    /// Arrival order within the channel, starting at 1.
    pub seq: u64,
    pub priority: Priority,
    pub event: NotificationEvent,
}

/// Receives dispatched events. Called synchronously, in arrival order.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &DispatchedEvent);
}

impl<F> EventSink for F
where
    F: Fn(&DispatchedEvent) + Send + Sync,
{
    fn on_event(&self, event: &DispatchedEvent) {
        self(event)
    }
}

/// Which events a subscriber wants. High-priority events always pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EventFilter {
    #[default]
    All,
    Kinds(HashSet<EventKind>),
}

impl EventFilter {
    pub fn kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        EventFilter::Kinds(kinds.into_iter().collect())
    }

    pub fn accepts(&self, event: &DispatchedEvent) -> bool {
        match self {
            _ if event.priority == Priority::High => true,
            EventFilter::All => true,
            EventFilter::Kinds(kinds) => kinds.contains(&event.event.kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    filter: EventFilter,
    sink: Arc<dyn EventSink>,
}

#[derive(Default)]
pub(crate) struct Dispatcher {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
}

impl Dispatcher {
    pub(crate) fn subscribe(&self, filter: EventFilter, sink: Arc<dyn EventSink>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscribers).push(Arc::new(Subscriber { id, filter, sink }));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Deliver to every interested subscriber, in registration order.
    pub(crate) fn dispatch(&self, event: &DispatchedEvent) {
        // Snapshot so sinks may subscribe or unsubscribe re-entrantly.
        let subscribers = lock(&self.subscribers).clone();
        for subscriber in subscribers.iter().filter(|s| s.filter.accepts(event)) {
            subscriber.sink.on_event(event);
        }
    }
}
