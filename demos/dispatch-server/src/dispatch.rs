//! Backend-side job book and notification log.

use farmhaul_core::{
    Cargo, Contact, Counterparties, DeliveryJob, EventKind, JobId, JobStatus, NotificationEvent,
    Payment, Route, Timestamps,
};
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

/// Notifications replayed to a freshly connected client.
const REPLAY: usize = 5;

#[derive(Debug, PartialEq)]
pub enum Refusal {
    NotFound,
    Conflict(String),
    BadRequest(String),
}

pub struct Dispatch {
    jobs: BTreeMap<JobId, DeliveryJob>,
    recent: VecDeque<NotificationEvent>,
    unread: u64,
    next_event: u64,
}

impl Dispatch {
    pub fn new() -> Self {
        Self {
            jobs: BTreeMap::new(),
            recent: VecDeque::new(),
            unread: 0,
            next_event: 1,
        }
    }

    /// A book with a few open jobs, each announced as an offer.
    pub fn seeded() -> Self {
        let mut dispatch = Self::new();
        let seeds = [
            ("J1", "maize", 40.0, "bags", "Kitale", "Nakuru", 5000.0),
            ("J2", "tomatoes", 12.0, "crates", "Naivasha", "Nairobi", 1800.0),
            ("J3", "potatoes", 2.5, "tonnes", "Nyandarua", "Thika", 9500.0),
        ];
        for (id, crop, quantity, unit, from, to, amount) in seeds {
            dispatch.publish(DeliveryJob {
                id: JobId::from(id),
                status: JobStatus::Available,
                cargo: Cargo {
                    crop_type: crop.into(),
                    quantity,
                    unit: unit.into(),
                },
                route: Route {
                    pickup_location: from.into(),
                    delivery_location: to.into(),
                },
                payment: Payment { amount },
                counterparties: Counterparties {
                    farmer: Contact {
                        name: format!("Farmer of {id}"),
                        phone: None,
                    },
                    buyer: Contact {
                        name: format!("Buyer of {id}"),
                        phone: None,
                    },
                },
                timestamps: Timestamps {
                    created_at: now(),
                    ..Default::default()
                },
                transporter: None,
            });
        }
        dispatch
    }

    pub fn publish(&mut self, job: DeliveryJob) -> NotificationEvent {
        let payload = json!({ "jobId": job.id, "amount": job.payment.amount });
        let title = format!("New delivery {}", job.id);
        let message = format!("{} to {}", job.route.pickup_location, job.route.delivery_location);
        self.jobs.insert(job.id.clone(), job);
        self.emit(EventKind::OfferReceived, title, message, payload)
    }

    pub fn available(&self) -> Vec<DeliveryJob> {
        self.jobs
            .values()
            .filter(|job| job.status == JobStatus::Available)
            .cloned()
            .collect()
    }

    pub fn assigned_to(&self, transporter: &str) -> Vec<DeliveryJob> {
        self.jobs
            .values()
            .filter(|job| job.transporter.as_deref() == Some(transporter))
            .cloned()
            .collect()
    }

    pub fn unread(&self) -> u64 {
        self.unread
    }

    pub fn replay(&self) -> impl Iterator<Item = &NotificationEvent> {
        self.recent.iter().rev()
    }

    pub fn accept(&mut self, id: &JobId, transporter: &str) -> Result<Vec<NotificationEvent>, Refusal> {
        let job = self.jobs.get_mut(id).ok_or(Refusal::NotFound)?;
        if job.status != JobStatus::Available {
            return Err(Refusal::Conflict("Delivery already taken".into()));
        }
        job.status = JobStatus::Accepted;
        job.transporter = Some(transporter.to_string());
        let event = self.status_changed(id, JobStatus::Accepted);
        Ok(vec![event])
    }

    /// Report `picked_up`, `in_transit` or `delivered`.
    pub fn report(&mut self, id: &JobId, status: JobStatus) -> Result<Vec<NotificationEvent>, Refusal> {
        if !matches!(
            status,
            JobStatus::PickedUp | JobStatus::InTransit | JobStatus::Delivered
        ) {
            return Err(Refusal::BadRequest(format!("cannot report {status}")));
        }
        let job = self.jobs.get_mut(id).ok_or(Refusal::NotFound)?;
        if !job.status.can_advance_to(status) {
            return Err(Refusal::Conflict(format!(
                "Delivery is {}, cannot move to {}",
                job.status, status
            )));
        }
        job.status = status;
        match status {
            JobStatus::PickedUp => job.timestamps.picked_up_at = Some(now()),
            JobStatus::Delivered => job.timestamps.delivered_at = Some(now()),
            _ => {}
        }
        Ok(vec![self.status_changed(id, status)])
    }

    /// Completing an already completed job succeeds without new events.
    pub fn complete(&mut self, id: &JobId) -> Result<Vec<NotificationEvent>, Refusal> {
        let job = self.jobs.get_mut(id).ok_or(Refusal::NotFound)?;
        match job.status {
            JobStatus::Completed => return Ok(Vec::new()),
            JobStatus::Delivered => {}
            other => {
                return Err(Refusal::Conflict(format!(
                    "Delivery is {other}, not delivered"
                )));
            }
        }
        job.status = JobStatus::Completed;
        let amount = job.payment.amount;

        let completed = self.emit(
            EventKind::DeliveryCompleted,
            format!("Delivery {id} completed"),
            String::new(),
            json!({ "jobId": id }),
        );
        let paid = self.emit(
            EventKind::PaymentConfirmed,
            "Payment released".into(),
            format!("{amount:.2} for delivery {id}"),
            json!({ "jobId": id, "amount": amount }),
        );
        Ok(vec![completed, paid])
    }

    fn status_changed(&mut self, id: &JobId, status: JobStatus) -> NotificationEvent {
        self.emit(
            EventKind::JobStatusChanged,
            format!("Delivery {id} is {status}"),
            String::new(),
            json!({ "jobId": id, "status": status }),
        )
    }

    fn emit(
        &mut self,
        kind: EventKind,
        title: String,
        message: String,
        payload: serde_json::Value,
    ) -> NotificationEvent {
        let mut event = NotificationEvent::new(self.next_event.to_string().as_str(), kind, title);
        self.next_event += 1;
        event.message = (!message.is_empty()).then_some(message);
        event.payload = payload;
        self.unread += 1;
        self.recent.push_front(event.clone());
        self.recent.truncate(REPLAY);
        event
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
