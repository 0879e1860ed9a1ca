//! Delivery job records.

use crate::JobStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What is being moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cargo {
    pub crop_type: String,
    pub quantity: f64,
    pub unit: String,
}

/// Where it is moved from and to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub pickup_location: String,
    pub delivery_location: String,
}

/// Transporter fee. Payable only once the job is completed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterparties {
    pub farmer: Contact,
    pub buyer: Contact,
}

/// Lifecycle timestamps, unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timestamps {
    pub created_at: u64,
    #[serde(default)]
    pub picked_up_at: Option<u64>,
    #[serde(default)]
    pub delivered_at: Option<u64>,
}

/// A single delivery obligation.
///
/// Only `status`, `transporter` and the optional timestamps ever change, and
/// only through the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryJob {
    pub id: JobId,
    pub status: JobStatus,
    pub cargo: Cargo,
    pub route: Route,
    pub payment: Payment,
    pub counterparties: Counterparties,
    #[serde(default)]
    pub timestamps: Timestamps,
    /// Transporter user id, set from `accepted` onward.
    #[serde(default)]
    pub transporter: Option<String>,
}

impl DeliveryJob {
    /// Payment amount if it has been released, i.e. the job is completed.
    pub fn payable_amount(&self) -> Option<f64> {
        (self.status == JobStatus::Completed).then_some(self.payment.amount)
    }

    /// Whether the record satisfies the assignment invariant: no transporter
    /// while available, exactly one afterwards.
    pub fn assignment_consistent(&self) -> bool {
        self.status.is_assigned() == self.transporter.is_some()
    }
}
