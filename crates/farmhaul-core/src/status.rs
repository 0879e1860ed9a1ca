//! Delivery job lifecycle.
//!
//! `available → accepted → picked_up → in_transit → delivered → completed`
//!
//! Strictly linear: no skipping, no cycles, terminal at `completed`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a delivery job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Listed, no transporter yet.
    Available,
    /// Claimed by exactly one transporter.
    Accepted,
    PickedUp,
    InTransit,
    Delivered,
    /// Payment released. Terminal.
    Completed,
}

impl JobStatus {
    /// Every status in lifecycle order.
    pub const ORDER: [JobStatus; 6] = [
        JobStatus::Available,
        JobStatus::Accepted,
        JobStatus::PickedUp,
        JobStatus::InTransit,
        JobStatus::Delivered,
        JobStatus::Completed,
    ];

    /// The single successor, or `None` at `completed`.
    pub fn next(self) -> Option<JobStatus> {
        match self {
            JobStatus::Available => Some(JobStatus::Accepted),
            JobStatus::Accepted => Some(JobStatus::PickedUp),
            JobStatus::PickedUp => Some(JobStatus::InTransit),
            JobStatus::InTransit => Some(JobStatus::Delivered),
            JobStatus::Delivered => Some(JobStatus::Completed),
            JobStatus::Completed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    /// Whether `target` is exactly the next step from `self`.
    pub fn can_advance_to(self, target: JobStatus) -> bool {
        self.next() == Some(target)
    }

    /// Whether moving into this status must be confirmed remotely before it
    /// is reflected locally. Financially consequential steps only.
    pub fn requires_confirmation(self) -> bool {
        matches!(
            self,
            JobStatus::Accepted | JobStatus::Delivered | JobStatus::Completed
        )
    }

    /// Whether a job in this status has an assigned transporter.
    pub fn is_assigned(self) -> bool {
        self != JobStatus::Available
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Available => "available",
            JobStatus::Accepted => "accepted",
            JobStatus::PickedUp => "picked_up",
            JobStatus::InTransit => "in_transit",
            JobStatus::Delivered => "delivered",
            JobStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ORDER
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A status string outside the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);
