//! Request/response API boundary.
//!
//! The lifecycle manager and unread ledger talk to the marketplace backend
//! only through these traits. [`crate::HttpApi`] is the production
//! implementation.

use farmhaul_core::{DeliveryJob, JobId, JobStatus};
use std::future::Future;

/// Job reads and mutations.
pub trait DeliveryApi: Send + Sync + 'static {
    fn list_available_deliveries(
        &self,
    ) -> impl Future<Output = Result<Vec<DeliveryJob>, ApiError>> + Send;

    fn list_my_deliveries(
        &self,
        actor_id: &str,
    ) -> impl Future<Output = Result<Vec<DeliveryJob>, ApiError>> + Send;

    fn accept_delivery(
        &self,
        job_id: &JobId,
        actor_id: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Report `picked_up`, `in_transit` or `delivered`.
    fn update_delivery_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Final transition; releases payment. Expected to be idempotent on
    /// the server.
    fn complete_delivery(&self, job_id: &JobId) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// Notification reads.
pub trait NotificationApi: Send + Sync + 'static {
    fn get_unread_notification_count(&self) -> impl Future<Output = Result<u64, ApiError>> + Send;
}

/// A remote call that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The server answered and said no.
    #[error("{}", .message.as_deref().unwrap_or("request rejected"))]
    Rejected {
        status: Option<u16>,
        message: Option<String>,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn rejected(message: impl Into<String>) -> Self {
        ApiError::Rejected {
            status: None,
            message: Some(message.into()),
        }
    }

    /// Human-readable reason supplied by the server, if there was one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}
