//! HTTP implementation of the marketplace API.

use crate::api::{ApiError, DeliveryApi, NotificationApi};
use crate::SessionStore;
use farmhaul_core::{DeliveryJob, JobId, JobStatus};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Talks to the backend over HTTP with the session's bearer token.
pub struct HttpApi {
    client: reqwest::Client,
    base: Url,
    session: Arc<SessionStore>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptRequest<'a> {
    transporter_id: &'a str,
}

#[derive(Serialize)]
struct StatusRequest {
    status: JobStatus,
}

#[derive(Deserialize)]
struct UnreadCount {
    count: u64,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "error")]
    message: Option<String>,
}

impl HttpApi {
    pub fn new(base: Url, session: Arc<SessionStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
            session,
        }
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        let joined = format!("{}/{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message);
        tracing::debug!("API rejected request with {}: {:?}", status, message);
        Err(ApiError::Rejected {
            status: Some(status.as_u16()),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        self.send(self.client.get(url))
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl DeliveryApi for HttpApi {
    async fn list_available_deliveries(&self) -> Result<Vec<DeliveryJob>, ApiError> {
        self.get_json(self.url("deliveries/available")).await
    }

    async fn list_my_deliveries(&self, actor_id: &str) -> Result<Vec<DeliveryJob>, ApiError> {
        let mut url = self.url("deliveries/mine");
        url.query_pairs_mut().append_pair("transporter", actor_id);
        self.get_json(url).await
    }

    async fn accept_delivery(&self, job_id: &JobId, actor_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("deliveries/{job_id}/accept"));
        let body = AcceptRequest {
            transporter_id: actor_id,
        };
        self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    async fn update_delivery_status(&self, job_id: &JobId, status: JobStatus) -> Result<(), ApiError> {
        let url = self.url(&format!("deliveries/{job_id}/status"));
        self.send(self.client.post(url).json(&StatusRequest { status }))
            .await?;
        Ok(())
    }

    async fn complete_delivery(&self, job_id: &JobId) -> Result<(), ApiError> {
        let url = self.url(&format!("deliveries/{job_id}/complete"));
        self.send(self.client.post(url)).await?;
        Ok(())
    }
}

impl NotificationApi for HttpApi {
    async fn get_unread_notification_count(&self) -> Result<u64, ApiError> {
        let body: UnreadCount = self.get_json(self.url("notifications/unread-count")).await?;
        Ok(body.count)
    }
}
