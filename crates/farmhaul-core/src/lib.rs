//! Core types for farmhaul.
//!
//! This crate provides the shared vocabulary: the delivery job lifecycle,
//! marketplace actors, and the real-time notification framing. Services
//! built on these types live in `farmhaul-client`.

mod actor;
mod event;
mod job;
mod message;
mod status;

pub use actor::{Actor, ActorParseError, Role};
pub use event::{EventId, EventKind, JobStatusChange, NotificationEvent, Priority};
pub use job::{Cargo, Contact, Counterparties, DeliveryJob, JobId, Payment, Route, Timestamps};
pub use message::{FrameError, ServerMessage};
pub use status::{JobStatus, UnknownStatus};

use serde::{Deserialize, Serialize};

/// Notification channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and none scheduled.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Live; frames are being dispatched.
    Connected,
    /// Connection ended, waiting out the backoff delay.
    ReconnectPending,
}

/// Which backend the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Production,
}
