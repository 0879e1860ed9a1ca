//! Real-time protocol frames.
//!
//! Every inbound text frame is a JSON object with a `type` discriminator.
//! Only `notification` is defined; other types are reserved and ignored.

use crate::NotificationEvent;
use serde::{Deserialize, Serialize};

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A pushed notification.
    Notification { notification: NotificationEvent },
    /// Any other discriminator. Reserved for future use.
    #[serde(other)]
    Reserved,
}

impl ServerMessage {
    /// Parse one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))
    }

    /// Encode a notification frame (server side and tests).
    pub fn notification(event: NotificationEvent) -> Self {
        ServerMessage::Notification {
            notification: event,
        }
    }

    pub fn to_json(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(|e| FrameError::Malformed(e.to_string()))
    }
}

/// An inbound frame that could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("malformed message: {0}")]
    Malformed(String),
}
