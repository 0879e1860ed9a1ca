//! Notification events pushed by the server.

use crate::{JobId, JobStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event identifier. The server may send a number or a string; both are
/// normalised to a string so they can be compared for de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawEventId", into = "String")]
pub struct EventId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEventId {
    Text(String),
    Number(u64),
}

impl From<RawEventId> for EventId {
    fn from(raw: RawEventId) -> Self {
        match raw {
            RawEventId::Text(s) => Self(s),
            RawEventId::Number(n) => Self(n.to_string()),
        }
    }
}

impl From<EventId> for String {
    fn from(id: EventId) -> Self {
        id.0
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl EventId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What happened. Unknown kinds from newer servers become `Generic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    JobStatusChanged,
    OfferReceived,
    OfferAccepted,
    PaymentConfirmed,
    DeliveryCompleted,
    #[default]
    Generic,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::JobStatusChanged => "job_status_changed",
            EventKind::OfferReceived => "offer_received",
            EventKind::OfferAccepted => "offer_accepted",
            EventKind::PaymentConfirmed => "payment_confirmed",
            EventKind::DeliveryCompleted => "delivery_completed",
            EventKind::Generic => "generic",
        }
    }

    /// Kinds that must reach the user even through a filtering subscriber.
    pub fn is_high_priority(&self) -> bool {
        matches!(
            self,
            EventKind::OfferReceived
                | EventKind::OfferAccepted
                | EventKind::PaymentConfirmed
                | EventKind::DeliveryCompleted
        )
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "job_status_changed" => EventKind::JobStatusChanged,
            "offer_received" => EventKind::OfferReceived,
            "offer_accepted" => EventKind::OfferAccepted,
            "payment_confirmed" => EventKind::PaymentConfirmed,
            "delivery_completed" => EventKind::DeliveryCompleted,
            _ => EventKind::Generic,
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Delivery priority stamped on every dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
}

/// A server-originated notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub id: EventId,
    #[serde(rename = "type", default)]
    pub kind: EventKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    /// Kind-specific data.
    #[serde(rename = "data", default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Payload of a job status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusChange {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobRef {
    job_id: JobId,
}

impl NotificationEvent {
    /// Create an unread event with no payload.
    pub fn new(id: impl Into<EventId>, kind: EventKind, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            message: None,
            is_read: false,
            payload: serde_json::Value::Null,
            created_at: None,
        }
    }

    /// The job transition this event reports, if any.
    ///
    /// `delivery_completed` only needs a `jobId`; it implies `completed`.
    pub fn job_status_change(&self) -> Option<JobStatusChange> {
        match self.kind {
            EventKind::JobStatusChanged => {
                serde_json::from_value(self.payload.clone()).ok()
            }
            EventKind::DeliveryCompleted => serde_json::from_value::<JobRef>(self.payload.clone())
                .ok()
                .map(|r| JobStatusChange {
                    job_id: r.job_id,
                    status: JobStatus::Completed,
                }),
            _ => None,
        }
    }

    /// Priority is decided here, never by subscribers.
    pub fn priority(&self) -> Priority {
        let completes_job = self
            .job_status_change()
            .is_some_and(|c| c.status == JobStatus::Completed);
        if self.kind.is_high_priority() || completes_job {
            Priority::High
        } else {
            Priority::Normal
        }
    }
}
