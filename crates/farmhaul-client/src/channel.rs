//! Notification channel.
//!
//! One supervisor task per authenticated session drives the connection:
//!
//! ```text
//! disconnected → connecting → connected
//!                    ↑            │ close / error / drop
//!                    └── reconnect_pending (backoff delay)
//! ```
//!
//! The loop runs until `disconnect` cancels it or the session it was started
//! for ends. Inbound frames are parsed, de-duplicated by event id, recorded in
//! the unread ledger and then dispatched, all in arrival order.

use crate::dedup::RecentIds;
use crate::dispatch::{DispatchedEvent, Dispatcher, EventFilter, EventSink, SubscriptionId};
use crate::transport::{ChannelError, Connector, FrameStream};
use crate::{lock, Backoff, SessionStore, UnreadLedger};
use farmhaul_core::{ConnectionState, EventKind, ServerMessage};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Shared<C> {
    connector: C,
    session: Arc<SessionStore>,
    ledger: Arc<UnreadLedger>,
    backoff: Backoff,
    connect_timeout: Duration,
    state: watch::Sender<ConnectionState>,
    dispatcher: Dispatcher,
    recent_ids: Mutex<RecentIds>,
    seq: AtomicU64,
    attempts: AtomicU64,
}

struct Worker {
    token: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

enum PumpExit {
    Dropped,
    Cancelled,
}

pub struct NotificationChannel<C: Connector> {
    shared: Arc<Shared<C>>,
    worker: tokio::sync::Mutex<Option<Worker>>,
}

impl<C: Connector> NotificationChannel<C> {
    pub fn new(
        connector: C,
        session: Arc<SessionStore>,
        ledger: Arc<UnreadLedger>,
        backoff: Backoff,
        connect_timeout: Duration,
        dedup_window: usize,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector,
                session,
                ledger,
                backoff,
                connect_timeout,
                state: watch::Sender::new(ConnectionState::Disconnected),
                dispatcher: Dispatcher::default(),
                recent_ids: Mutex::new(RecentIds::new(dedup_window)),
                seq: AtomicU64::new(0),
                attempts: AtomicU64::new(0),
            }),
            worker: tokio::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Connection attempts made so far, across sessions.
    pub fn connect_attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    pub fn on_event(&self, sink: impl EventSink + 'static) -> SubscriptionId {
        self.shared.dispatcher.subscribe(EventFilter::All, Arc::new(sink))
    }

    /// Subscribe to some kinds only. High-priority events are delivered
    /// regardless.
    pub fn on_event_filtered(
        &self,
        kinds: impl IntoIterator<Item = EventKind>,
        sink: impl EventSink + 'static,
    ) -> SubscriptionId {
        self.shared
            .dispatcher
            .subscribe(EventFilter::kinds(kinds), Arc::new(sink))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.dispatcher.unsubscribe(id)
    }

    /// Start the connection loop for the current session.
    ///
    /// Without a stored credential this does nothing and the channel stays
    /// disconnected. Calling it again for the same session is a no-op; for a
    /// different session the old loop is stopped first.
    pub async fn connect(&self) {
        let Some(token) = self.shared.session.token() else {
            tracing::debug!("No stored credential; notification channel stays disconnected");
            return;
        };

        let mut worker = self.worker.lock().await;
        if let Some(current) = worker.as_ref() {
            if current.token == token && !current.handle.is_finished() {
                return;
            }
        }
        if let Some(previous) = worker.take() {
            stop(previous).await;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(supervise(self.shared.clone(), token.clone(), cancel.clone()));
        *worker = Some(Worker {
            token,
            cancel,
            handle,
        });
    }

    /// Stop the loop, close any live connection and cancel any pending
    /// reconnect. Nothing is dispatched once this returns.
    pub async fn disconnect(&self) {
        if let Some(worker) = self.worker.lock().await.take() {
            stop(worker).await;
        }
        lock(&self.shared.recent_ids).clear();
        self.shared.set_state(ConnectionState::Disconnected);
        tracing::info!("Notification channel disconnected");
    }
}

impl<C: Connector> Drop for NotificationChannel<C> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel();
        }
    }
}

async fn stop(worker: Worker) {
    worker.cancel.cancel();
    if let Err(e) = worker.handle.await {
        tracing::warn!("Notification worker ended abnormally: {}", e);
    }
}

async fn supervise<C: Connector>(shared: Arc<Shared<C>>, token: String, cancel: CancellationToken) {
    let mut failures: u32 = 0;
    loop {
        if shared.session.token().as_deref() != Some(token.as_str()) {
            tracing::debug!("Session ended; stopping reconnect loop");
            break;
        }

        shared.set_state(ConnectionState::Connecting);
        let attempt = shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = tokio::time::timeout(shared.connect_timeout, shared.connector.connect(&token)) => {
                result.unwrap_or(Err(ChannelError::Timeout(shared.connect_timeout)))
            }
        };

        match connected {
            Ok(frames) => {
                failures = 0;
                shared.set_state(ConnectionState::Connected);
                tracing::info!("Notification channel connected (attempt {})", attempt);
                if let PumpExit::Cancelled = shared.pump(frames, &cancel).await {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Notification channel connect failed: {}", e);
            }
        }

        shared.set_state(ConnectionState::ReconnectPending);
        let delay = shared.backoff.delay(failures);
        failures = failures.saturating_add(1);
        tracing::debug!("Reconnecting in {:?}", delay);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    shared.set_state(ConnectionState::Disconnected);
}

impl<C> Shared<C> {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    async fn pump(&self, mut frames: FrameStream, cancel: &CancellationToken) -> PumpExit {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PumpExit::Cancelled,
                frame = frames.next() => match frame {
                    Some(Ok(text)) => self.handle_frame(&text),
                    Some(Err(e)) => {
                        tracing::debug!("Notification connection dropped: {}", e);
                        return PumpExit::Dropped;
                    }
                    None => {
                        tracing::debug!("Notification connection closed");
                        return PumpExit::Dropped;
                    }
                },
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        let notification = match ServerMessage::parse(text) {
            Ok(ServerMessage::Notification { notification }) => notification,
            Ok(ServerMessage::Reserved) => {
                tracing::trace!("Ignoring reserved frame type");
                return;
            }
            Err(e) => {
                tracing::debug!("Dropping frame: {}", e);
                return;
            }
        };

        if !lock(&self.recent_ids).insert(&notification.id) {
            tracing::debug!("Duplicate notification {} skipped", notification.id);
            return;
        }

        self.ledger.record_incoming(&notification);
        let dispatched = DispatchedEvent {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            priority: notification.priority(),
            event: notification,
        };
        self.dispatcher.dispatch(&dispatched);
    }
}
