//! In-memory doubles for the API and transport seams.

use crate::api::{ApiError, DeliveryApi, NotificationApi};
use crate::lock;
use crate::transport::{ChannelError, Connector, FrameStream};
use farmhaul_core::{
    Cargo, Contact, Counterparties, DeliveryJob, JobId, JobStatus, Payment, Route, Timestamps,
};
use futures_util::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

pub fn job(id: &str, status: JobStatus, transporter: Option<&str>) -> DeliveryJob {
    DeliveryJob {
        id: JobId::from(id),
        status,
        cargo: Cargo {
            crop_type: "maize".into(),
            quantity: 40.0,
            unit: "bags".into(),
        },
        route: Route {
            pickup_location: "Kitale".into(),
            delivery_location: "Nakuru".into(),
        },
        payment: Payment { amount: 5000.0 },
        counterparties: Counterparties {
            farmer: Contact {
                name: "Wanjiru".into(),
                phone: None,
            },
            buyer: Contact {
                name: "Mill Co".into(),
                phone: None,
            },
        },
        timestamps: Timestamps {
            created_at: 1_700_000_000,
            ..Default::default()
        },
        transporter: transporter.map(str::to_string),
    }
}

/// A `notification` frame as the server sends it.
pub fn notification_frame(id: &str, kind: &str, is_read: bool) -> String {
    serde_json::json!({
        "type": "notification",
        "notification": {
            "id": id,
            "type": kind,
            "title": format!("{kind} {id}"),
            "isRead": is_read,
        }
    })
    .to_string()
}

#[derive(Default)]
struct MockState {
    available: Vec<DeliveryJob>,
    mine: Vec<DeliveryJob>,
    unread: u64,
    failures: HashMap<&'static str, ApiError>,
    delay: Option<Duration>,
    calls: Vec<String>,
}

/// Records every call and answers from canned data.
#[derive(Default)]
pub struct MockApi {
    state: Mutex<MockState>,
}

impl MockApi {
    pub fn set_available(&self, jobs: Vec<DeliveryJob>) {
        lock(&self.state).available = jobs;
    }

    pub fn set_mine(&self, jobs: Vec<DeliveryJob>) {
        lock(&self.state).mine = jobs;
    }

    pub fn set_unread(&self, count: u64) {
        lock(&self.state).unread = count;
    }

    /// Make every call of `op` fail with `error`.
    pub fn fail(&self, op: &'static str, error: ApiError) {
        lock(&self.state).failures.insert(op, error);
    }

    pub fn set_delay(&self, delay: Duration) {
        lock(&self.state).delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    async fn call<T>(
        &self,
        op: &'static str,
        record: String,
        answer: impl FnOnce(&MockState) -> T,
    ) -> Result<T, ApiError> {
        let delay = {
            let mut state = lock(&self.state);
            state.calls.push(record);
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = lock(&self.state);
        match state.failures.get(op) {
            Some(error) => Err(error.clone()),
            None => Ok(answer(&state)),
        }
    }
}

impl DeliveryApi for MockApi {
    async fn list_available_deliveries(&self) -> Result<Vec<DeliveryJob>, ApiError> {
        self.call("available", "available".into(), |s| s.available.clone())
            .await
    }

    async fn list_my_deliveries(&self, actor_id: &str) -> Result<Vec<DeliveryJob>, ApiError> {
        self.call("mine", format!("mine {actor_id}"), |s| s.mine.clone())
            .await
    }

    async fn accept_delivery(&self, job_id: &JobId, actor_id: &str) -> Result<(), ApiError> {
        self.call("accept", format!("accept {job_id} {actor_id}"), |_| ())
            .await
    }

    async fn update_delivery_status(&self, job_id: &JobId, status: JobStatus) -> Result<(), ApiError> {
        self.call("status", format!("status {job_id} {status}"), |_| ())
            .await
    }

    async fn complete_delivery(&self, job_id: &JobId) -> Result<(), ApiError> {
        self.call("complete", format!("complete {job_id}"), |_| ())
            .await
    }
}

impl NotificationApi for MockApi {
    async fn get_unread_notification_count(&self) -> Result<u64, ApiError> {
        self.call("unread", "unread".into(), |s| s.unread).await
    }
}

/// Server side of one scripted connection. Dropping it closes the
/// connection.
pub type Link = mpsc::UnboundedSender<Result<String, ChannelError>>;

enum Script {
    Accept(mpsc::UnboundedReceiver<Result<String, ChannelError>>),
    Refuse,
    Hang,
}

/// Hands out scripted connections in order. Runs out by refusing.
pub struct ScriptedConnector {
    scripts: Mutex<VecDeque<Script>>,
    attempts: watch::Sender<u64>,
    attempt_times: Mutex<Vec<Instant>>,
    live: Arc<AtomicUsize>,
    max_live: AtomicUsize,
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            attempts: watch::Sender::new(0),
            attempt_times: Mutex::new(Vec::new()),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: AtomicUsize::new(0),
        }
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedConnector {
    pub fn accept_next(&self) -> Link {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.scripts).push_back(Script::Accept(rx));
        tx
    }

    pub fn refuse_next(&self) {
        lock(&self.scripts).push_back(Script::Refuse);
    }

    /// The next handshake never completes.
    pub fn hang_next(&self) {
        lock(&self.scripts).push_back(Script::Hang);
    }

    pub fn attempts(&self) -> u64 {
        *self.attempts.borrow()
    }

    pub async fn wait_attempts(&self, n: u64) {
        let mut rx = self.attempts.subscribe();
        let _ = rx.wait_for(|a| *a >= n).await;
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        lock(&self.attempt_times).clone()
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    async fn connect(&self, token: &str) -> Result<FrameStream, ChannelError> {
        assert!(!token.is_empty());
        lock(&self.attempt_times).push(Instant::now());
        self.attempts.send_modify(|a| *a += 1);

        let script = lock(&self.scripts).pop_front();
        let rx = match script {
            Some(Script::Accept(rx)) => rx,
            Some(Script::Refuse) | None => {
                return Err(ChannelError::Connect("connection refused".into()));
            }
            Some(Script::Hang) => return std::future::pending().await,
        };

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        let guard = LiveGuard(self.live.clone());
        let frames = futures_util::stream::unfold((rx, guard), |(mut rx, guard)| async move {
            let item = rx.recv().await?;
            Some((item, (rx, guard)))
        });
        Ok(frames.boxed())
    }
}
