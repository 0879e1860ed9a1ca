//! Per-process composition root.

use crate::api::{ApiError, DeliveryApi, NotificationApi};
use crate::channel::NotificationChannel;
use crate::dispatch::DispatchedEvent;
use crate::lifecycle::{DeliveryManager, LifecycleError};
use crate::transport::{Connector, WsConnector};
use crate::{ClientConfig, ConfigError, HttpApi, Session, SessionError, SessionStore, UnreadLedger};
use farmhaul_core::Actor;
use std::sync::Arc;

/// Builds each service once and wires them together.
///
/// Pushed job status changes flow into the lifecycle manager; pushed
/// notifications flow into the unread ledger. Login starts the channel and
/// logout tears everything down.
pub struct DeliveryClient<A, C: Connector> {
    api: Arc<A>,
    session: Arc<SessionStore>,
    deliveries: Arc<DeliveryManager<A>>,
    ledger: Arc<UnreadLedger>,
    channel: NotificationChannel<C>,
}

impl DeliveryClient<HttpApi, WsConnector> {
    /// Production wiring: HTTP for requests, WebSocket for pushes.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let session = Arc::new(match &config.session_file {
            Some(path) => SessionStore::persistent(path),
            None => SessionStore::in_memory(),
        });
        let api = HttpApi::new(config.api_base()?, session.clone());
        let connector = WsConnector::new(config.notifications_endpoint()?);
        Ok(Self::new(config, api, connector, session))
    }
}

impl<A, C> DeliveryClient<A, C>
where
    A: DeliveryApi + NotificationApi,
    C: Connector,
{
    pub fn new(config: &ClientConfig, api: A, connector: C, session: Arc<SessionStore>) -> Self {
        let api = Arc::new(api);
        let deliveries = Arc::new(DeliveryManager::new(
            api.clone(),
            session.clone(),
            config.mutation_timeout(),
        ));
        let ledger = Arc::new(UnreadLedger::new(config.history_capacity));
        let channel = NotificationChannel::new(
            connector,
            session.clone(),
            ledger.clone(),
            config.reconnect,
            config.connect_timeout(),
            config.dedup_window,
        );

        let reconcile = deliveries.clone();
        channel.on_event(move |dispatched: &DispatchedEvent| {
            if let Some(change) = dispatched.event.job_status_change() {
                reconcile.apply_remote_status(&change);
            }
        });

        Self {
            api,
            session,
            deliveries,
            ledger,
            channel,
        }
    }

    /// Store the credential and bring the services up for `actor`.
    pub async fn login(&self, actor: Actor, token: impl Into<String>) -> Result<(), SessionError> {
        if self.session.is_authenticated() {
            self.shutdown().await;
        }
        self.session.login(Session::new(actor, token))?;
        self.start().await;
        Ok(())
    }

    /// Pick up a persisted session. Returns false if there was none.
    pub async fn resume(&self) -> Result<bool, SessionError> {
        let Some(session) = self.session.restore()? else {
            return Ok(false);
        };
        tracing::info!("Resuming session for {}", session.actor);
        self.start().await;
        Ok(true)
    }

    /// End the session: close the channel, forget local state and the
    /// credential.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.shutdown().await;
        self.session.logout()
    }

    /// Reload jobs and the unread count from the server.
    pub async fn refresh(&self) -> Result<(), LifecycleError> {
        if let Err(e) = self.ledger.refresh(self.api.as_ref()).await {
            tracing::debug!("Keeping local unread count: {}", e);
        }
        self.deliveries.load().await.map(|_| ())
    }

    /// Pull the unread count without touching jobs.
    pub async fn refresh_unread(&self) -> Result<u64, ApiError> {
        self.ledger.refresh(self.api.as_ref()).await
    }

    async fn start(&self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!("Initial load failed: {}", e);
        }
        self.channel.connect().await;
    }

    async fn shutdown(&self) {
        self.channel.disconnect().await;
        self.ledger.clear();
        self.deliveries.clear();
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn deliveries(&self) -> &DeliveryManager<A> {
        &self.deliveries
    }

    pub fn ledger(&self) -> &UnreadLedger {
        &self.ledger
    }

    pub fn channel(&self) -> &NotificationChannel<C> {
        &self.channel
    }
}
