//! Delivery lifecycle manager.
//!
//! Owns the jobs visible to the current actor and is the only place their
//! status changes. Steps that move money (`accepted`, `delivered`,
//! `completed`) are confirmed by the server before they are applied
//! locally. The informational steps (`picked_up`, `in_transit`) are applied
//! at once and rolled back if the server refuses them.

use crate::api::{ApiError, DeliveryApi};
use crate::{lock, SessionStore};
use farmhaul_core::{Actor, DeliveryJob, JobId, JobStatus, JobStatusChange, Role};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const ACCEPT_FAILED: &str = "Failed to accept delivery";
const UPDATE_FAILED: &str = "Failed to update delivery status";

/// The single successor of `status`, or `None` once completed.
pub fn next_status(status: JobStatus) -> Option<JobStatus> {
    status.next()
}

/// Why a lifecycle operation did not take effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("cannot move job from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    #[error("{0}")]
    AcceptFailed(String),
    #[error("{0}")]
    MutationFailed(String),
    #[error("job {0} already has a change in flight")]
    ConcurrentModification(JobId),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0} accounts cannot take delivery jobs")]
    NotPermitted(Role),
    #[error("job {0} is not assigned to the current transporter")]
    NotAssigned(JobId),
    #[error("acceptance was not confirmed")]
    Declined,
    #[error("no active session")]
    NoSession,
    #[error("failed to load deliveries: {0}")]
    Load(ApiError),
}

enum RemoteFailure {
    Rejected(ApiError),
    TimedOut(Duration),
}

impl RemoteFailure {
    fn into_error(self, wrap: fn(String) -> LifecycleError, fallback: &str) -> LifecycleError {
        match self {
            RemoteFailure::Rejected(e) => {
                wrap(e.server_message().unwrap_or(fallback).to_string())
            }
            RemoteFailure::TimedOut(after) => LifecycleError::Timeout(after),
        }
    }
}

/// Marks a job as having a mutation in flight until dropped.
struct InFlight<'a> {
    jobs: &'a Mutex<HashSet<JobId>>,
    id: JobId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.jobs).remove(&self.id);
    }
}

pub struct DeliveryManager<A> {
    api: Arc<A>,
    session: Arc<SessionStore>,
    timeout: Duration,
    jobs: Mutex<BTreeMap<JobId, DeliveryJob>>,
    in_flight: Mutex<HashSet<JobId>>,
}

impl<A: DeliveryApi> DeliveryManager<A> {
    pub fn new(api: Arc<A>, session: Arc<SessionStore>, timeout: Duration) -> Self {
        Self {
            api,
            session,
            timeout,
            jobs: Mutex::new(BTreeMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Replace local state with the server's view for the current actor.
    pub async fn load(&self) -> Result<usize, LifecycleError> {
        let actor = self.session.actor().ok_or(LifecycleError::NoSession)?;
        let available = self
            .remote(self.api.list_available_deliveries())
            .await
            .map_err(load_error)?;
        let mine = self
            .remote(self.api.list_my_deliveries(actor.id()))
            .await
            .map_err(load_error)?;

        let mut jobs = lock(&self.jobs);
        jobs.clear();
        for job in available.into_iter().chain(mine) {
            if !job.assignment_consistent() {
                tracing::warn!("Job {} is {} without consistent assignment", job.id, job.status);
            }
            jobs.insert(job.id.clone(), job);
        }
        tracing::debug!("Loaded {} deliveries for {}", jobs.len(), actor);
        Ok(jobs.len())
    }

    /// Insert or replace a job record, e.g. after a listing refresh.
    pub fn upsert(&self, job: DeliveryJob) {
        lock(&self.jobs).insert(job.id.clone(), job);
    }

    pub fn clear(&self) {
        lock(&self.jobs).clear();
    }

    pub fn get(&self, id: &JobId) -> Option<DeliveryJob> {
        lock(&self.jobs).get(id).cloned()
    }

    /// Jobs nobody has accepted yet.
    pub fn available(&self) -> Vec<DeliveryJob> {
        self.filtered(|s| s == JobStatus::Available)
    }

    /// Accepted jobs that are still moving.
    pub fn active(&self) -> Vec<DeliveryJob> {
        self.filtered(|s| s != JobStatus::Available && !s.is_terminal())
    }

    pub fn completed(&self) -> Vec<DeliveryJob> {
        self.filtered(JobStatus::is_terminal)
    }

    fn filtered(&self, keep: impl Fn(JobStatus) -> bool) -> Vec<DeliveryJob> {
        lock(&self.jobs)
            .values()
            .filter(|job| keep(job.status))
            .cloned()
            .collect()
    }

    pub async fn accept_job(&self, id: &JobId, actor: &Actor) -> Result<DeliveryJob, LifecycleError> {
        self.accept_job_with(id, actor, |_| true).await
    }

    /// Accept with a pre-commit hook. The hook sees the job as it stands
    /// and returning `false` cancels before anything is sent.
    pub async fn accept_job_with<F>(
        &self,
        id: &JobId,
        actor: &Actor,
        confirm: F,
    ) -> Result<DeliveryJob, LifecycleError>
    where
        F: FnOnce(&DeliveryJob) -> bool,
    {
        if !actor.is_transporter() {
            return Err(LifecycleError::NotPermitted(actor.role()));
        }
        let _guard = self.begin(id)?;
        let job = self.get(id).ok_or_else(|| LifecycleError::NotFound(id.clone()))?;
        if job.status != JobStatus::Available {
            return Err(LifecycleError::InvalidTransition {
                from: job.status,
                to: JobStatus::Accepted,
            });
        }
        if !confirm(&job) {
            return Err(LifecycleError::Declined);
        }

        self.remote(self.api.accept_delivery(id, actor.id()))
            .await
            .map_err(|f| f.into_error(LifecycleError::AcceptFailed, ACCEPT_FAILED))?;

        let accepted = self.update(id, |job| {
            if job.status == JobStatus::Available {
                job.status = JobStatus::Accepted;
            }
            job.transporter = Some(actor.id().to_string());
        })?;
        tracing::info!("Job {} accepted by {}", id, actor);
        Ok(accepted)
    }

    /// Move a job to `target`, which must be the immediate successor of its
    /// current status.
    pub async fn advance(&self, id: &JobId, target: JobStatus) -> Result<DeliveryJob, LifecycleError> {
        if target == JobStatus::Accepted {
            self.check_successor(id, target)?;
            let actor = self.session.actor().ok_or(LifecycleError::NoSession)?;
            return self.accept_job(id, &actor).await;
        }

        let _guard = self.begin(id)?;
        let before = self.check_successor(id, target)?;
        let actor = self.session.actor().ok_or(LifecycleError::NoSession)?;
        if before.transporter.as_deref() != Some(actor.id()) {
            return Err(LifecycleError::NotAssigned(id.clone()));
        }

        if target.requires_confirmation() {
            self.confirmed_advance(id, target).await
        } else {
            self.optimistic_advance(id, &before, target).await
        }
    }

    async fn confirmed_advance(&self, id: &JobId, target: JobStatus) -> Result<DeliveryJob, LifecycleError> {
        let outcome = if target == JobStatus::Completed {
            self.remote(self.api.complete_delivery(id)).await
        } else {
            self.remote(self.api.update_delivery_status(id, target)).await
        };
        outcome.map_err(|f| f.into_error(LifecycleError::MutationFailed, UPDATE_FAILED))?;

        let job = self.update(id, |job| {
            if job.status < target {
                apply_status(job, target);
            }
        })?;
        if target == JobStatus::Completed {
            tracing::info!("Job {} completed; payment of {} released", id, job.payment.amount);
        } else {
            tracing::info!("Job {} moved to {}", id, target);
        }
        Ok(job)
    }

    async fn optimistic_advance(
        &self,
        id: &JobId,
        before: &DeliveryJob,
        target: JobStatus,
    ) -> Result<DeliveryJob, LifecycleError> {
        let job = self.update(id, |job| apply_status(job, target))?;
        tracing::debug!("Job {} moved to {} pending confirmation", id, target);

        match self.remote(self.api.update_delivery_status(id, target)).await {
            Ok(()) => Ok(job),
            Err(failure) => {
                let rolled_back = self.update(id, |job| {
                    if job.status == target {
                        job.status = before.status;
                        job.timestamps = before.timestamps;
                    }
                });
                if rolled_back.is_ok() {
                    tracing::warn!("Job {} rolled back to {}", id, before.status);
                }
                Err(failure.into_error(LifecycleError::MutationFailed, UPDATE_FAILED))
            }
        }
    }

    /// Merge a server-pushed status. Applied only if it moves the job
    /// forward; returns whether anything changed.
    ///
    /// A push taking an unassigned job past `available` means another
    /// transporter won it. A transporter drops such a job from its store;
    /// other roles keep it at `available` until the next load.
    pub fn apply_remote_status(&self, change: &JobStatusChange) -> bool {
        let accepting = lock(&self.in_flight).contains(&change.job_id);
        let transporter = self.session.actor().filter(Actor::is_transporter);
        let mut jobs = lock(&self.jobs);
        let Some(job) = jobs.get_mut(&change.job_id) else {
            tracing::debug!("Status push for unknown job {}", change.job_id);
            return false;
        };
        if change.status <= job.status {
            tracing::trace!(
                "Discarding push {} for job {} already at {}",
                change.status,
                change.job_id,
                job.status
            );
            return false;
        }
        if job.transporter.is_none() && change.status.is_assigned() {
            // Our own accept settles the transporter when it returns.
            if accepting || transporter.is_none() {
                tracing::debug!("Holding job {} at {} until assigned", change.job_id, job.status);
                return false;
            }
            jobs.remove(&change.job_id);
            tracing::debug!("Job {} taken by another transporter", change.job_id);
            return true;
        }
        apply_status(job, change.status);
        tracing::debug!("Job {} reconciled to {}", change.job_id, change.status);
        true
    }

    fn check_successor(&self, id: &JobId, target: JobStatus) -> Result<DeliveryJob, LifecycleError> {
        let job = self.get(id).ok_or_else(|| LifecycleError::NotFound(id.clone()))?;
        if !job.status.can_advance_to(target) {
            return Err(LifecycleError::InvalidTransition {
                from: job.status,
                to: target,
            });
        }
        Ok(job)
    }

    fn begin(&self, id: &JobId) -> Result<InFlight<'_>, LifecycleError> {
        if !lock(&self.in_flight).insert(id.clone()) {
            return Err(LifecycleError::ConcurrentModification(id.clone()));
        }
        Ok(InFlight {
            jobs: &self.in_flight,
            id: id.clone(),
        })
    }

    fn update(&self, id: &JobId, change: impl FnOnce(&mut DeliveryJob)) -> Result<DeliveryJob, LifecycleError> {
        let mut jobs = lock(&self.jobs);
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;
        change(job);
        Ok(job.clone())
    }

    async fn remote<T>(&self, call: impl Future<Output = Result<T, ApiError>>) -> Result<T, RemoteFailure> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RemoteFailure::Rejected(e)),
            Err(_) => Err(RemoteFailure::TimedOut(self.timeout)),
        }
    }
}

fn load_error(failure: RemoteFailure) -> LifecycleError {
    match failure {
        RemoteFailure::Rejected(e) => LifecycleError::Load(e),
        RemoteFailure::TimedOut(after) => LifecycleError::Timeout(after),
    }
}

fn apply_status(job: &mut DeliveryJob, status: JobStatus) {
    let now = now();
    job.status = status;
    match status {
        JobStatus::PickedUp => {
            job.timestamps.picked_up_at.get_or_insert(now);
        }
        JobStatus::Delivered => {
            job.timestamps.delivered_at.get_or_insert(now);
        }
        _ => {}
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{job, MockApi};
    use crate::Session;

    fn manager(api: Arc<MockApi>) -> DeliveryManager<MockApi> {
        let session = Arc::new(SessionStore::in_memory());
        session
            .login(Session::new(Actor::transporter("T1"), "tok"))
            .unwrap();
        DeliveryManager::new(api, session, Duration::from_secs(5))
    }

    fn j1() -> JobId {
        JobId::from("J1")
    }

    #[tokio::test]
    async fn end_to_end_lifecycle() {
        let api = Arc::new(MockApi::default());
        let manager = manager(api.clone());
        manager.upsert(job("J1", JobStatus::Available, None));
        let t1 = Actor::transporter("T1");

        let accepted = manager.accept_job(&j1(), &t1).await.unwrap();
        assert_eq!(accepted.status, JobStatus::Accepted);
        assert_eq!(accepted.transporter.as_deref(), Some("T1"));

        for bad in [JobStatus::Available, JobStatus::InTransit] {
            assert_eq!(
                manager.advance(&j1(), bad).await,
                Err(LifecycleError::InvalidTransition {
                    from: JobStatus::Accepted,
                    to: bad
                })
            );
        }

        for step in [
            JobStatus::PickedUp,
            JobStatus::InTransit,
            JobStatus::Delivered,
            JobStatus::Completed,
        ] {
            let job = manager.advance(&j1(), step).await.unwrap();
            assert_eq!(job.status, step);
        }

        let done = manager.get(&j1()).unwrap();
        assert_eq!(done.payable_amount(), Some(5000.0));
        assert!(done.timestamps.picked_up_at.is_some());
        assert!(done.timestamps.delivered_at.is_some());
        assert_eq!(
            api.calls(),
            vec![
                "accept J1 T1",
                "status J1 picked_up",
                "status J1 in_transit",
                "status J1 delivered",
                "complete J1",
            ]
        );
    }

    #[tokio::test]
    async fn rejects_every_non_successor() {
        let api = Arc::new(MockApi::default());
        let manager = manager(api.clone());
        for (i, from) in JobStatus::ORDER.into_iter().enumerate() {
            let id = JobId::new(format!("J{i}"));
            let transporter = from.is_assigned().then_some("T1");
            manager.upsert(job(id.as_str(), from, transporter));
            for to in JobStatus::ORDER {
                if from.next() == Some(to) {
                    continue;
                }
                assert_eq!(
                    manager.advance(&id, to).await,
                    Err(LifecycleError::InvalidTransition { from, to }),
                    "{from} -> {to}"
                );
                assert_eq!(manager.get(&id).unwrap().status, from);
            }
        }
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn accept_failure_leaves_job_available() {
        let api = Arc::new(MockApi::default());
        api.fail("accept", ApiError::rejected("Delivery already taken"));
        let manager = manager(api.clone());
        manager.upsert(job("J1", JobStatus::Available, None));

        let err = manager
            .accept_job(&j1(), &Actor::transporter("T1"))
            .await
            .unwrap_err();
        assert_eq!(err, LifecycleError::AcceptFailed("Delivery already taken".into()));
        let job = manager.get(&j1()).unwrap();
        assert_eq!(job.status, JobStatus::Available);
        assert_eq!(job.transporter, None);
    }

    #[tokio::test]
    async fn accept_failure_without_message_uses_generic_reason() {
        let api = Arc::new(MockApi::default());
        api.fail("accept", ApiError::Transport("connection reset".into()));
        let manager = manager(api);
        manager.upsert(job("J1", JobStatus::Available, None));

        let err = manager
            .accept_job(&j1(), &Actor::transporter("T1"))
            .await
            .unwrap_err();
        assert_eq!(err, LifecycleError::AcceptFailed(ACCEPT_FAILED.into()));
    }

    #[tokio::test]
    async fn declined_confirmation_sends_nothing() {
        let api = Arc::new(MockApi::default());
        let manager = manager(api.clone());
        manager.upsert(job("J1", JobStatus::Available, None));

        let err = manager
            .accept_job_with(&j1(), &Actor::transporter("T1"), |job| {
                job.payment.amount > 10_000.0
            })
            .await
            .unwrap_err();
        assert_eq!(err, LifecycleError::Declined);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn only_transporters_accept() {
        let api = Arc::new(MockApi::default());
        let manager = manager(api.clone());
        manager.upsert(job("J1", JobStatus::Available, None));

        let err = manager
            .accept_job(&j1(), &Actor::farmer("F1"))
            .await
            .unwrap_err();
        assert_eq!(err, LifecycleError::NotPermitted(Role::Farmer));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn only_assigned_transporter_advances() {
        let api = Arc::new(MockApi::default());
        let manager = manager(api);
        manager.upsert(job("J1", JobStatus::Accepted, Some("T2")));

        assert_eq!(
            manager.advance(&j1(), JobStatus::PickedUp).await,
            Err(LifecycleError::NotAssigned(j1()))
        );
    }

    #[tokio::test]
    async fn optimistic_step_rolls_back_on_failure() {
        let api = Arc::new(MockApi::default());
        api.fail("status", ApiError::rejected("Pickup not confirmed by farmer"));
        let manager = manager(api);
        manager.upsert(job("J1", JobStatus::Accepted, Some("T1")));

        let err = manager.advance(&j1(), JobStatus::PickedUp).await.unwrap_err();
        assert_eq!(
            err,
            LifecycleError::MutationFailed("Pickup not confirmed by farmer".into())
        );
        let job = manager.get(&j1()).unwrap();
        assert_eq!(job.status, JobStatus::Accepted);
        assert_eq!(job.timestamps.picked_up_at, None);
    }

    #[tokio::test]
    async fn confirmed_step_waits_for_server() {
        let api = Arc::new(MockApi::default());
        api.fail("complete", ApiError::rejected("Escrow unavailable"));
        let manager = manager(api);
        manager.upsert(job("J1", JobStatus::Delivered, Some("T1")));

        let err = manager.advance(&j1(), JobStatus::Completed).await.unwrap_err();
        assert_eq!(err, LifecycleError::MutationFailed("Escrow unavailable".into()));
        assert_eq!(manager.get(&j1()).unwrap().status, JobStatus::Delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn optimistic_step_is_visible_before_confirmation() {
        let api = Arc::new(MockApi::default());
        api.set_delay(Duration::from_secs(1));
        let manager = manager(api);
        manager.upsert(job("J1", JobStatus::Accepted, Some("T1")));

        let id = j1();
        let (result, seen) = tokio::join!(manager.advance(&id, JobStatus::PickedUp), async {
            tokio::task::yield_now().await;
            manager.get(&id).unwrap().status
        });
        assert_eq!(seen, JobStatus::PickedUp);
        assert_eq!(result.unwrap().status, JobStatus::PickedUp);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_rolls_back() {
        let api = Arc::new(MockApi::default());
        api.set_delay(Duration::from_secs(30));
        let manager = manager(api);
        manager.upsert(job("J1", JobStatus::PickedUp, Some("T1")));

        let err = manager.advance(&j1(), JobStatus::InTransit).await.unwrap_err();
        assert_eq!(err, LifecycleError::Timeout(Duration::from_secs(5)));
        assert_eq!(manager.get(&j1()).unwrap().status, JobStatus::PickedUp);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_mutation_is_rejected() {
        let api = Arc::new(MockApi::default());
        api.set_delay(Duration::from_secs(1));
        let manager = manager(api.clone());
        manager.upsert(job("J1", JobStatus::Accepted, Some("T1")));

        let id = j1();
        let (first, second) = tokio::join!(
            manager.advance(&id, JobStatus::PickedUp),
            manager.advance(&id, JobStatus::PickedUp)
        );
        assert_eq!(first.unwrap().status, JobStatus::PickedUp);
        assert_eq!(second, Err(LifecycleError::ConcurrentModification(j1())));
        assert_eq!(api.calls(), vec!["status J1 picked_up"]);

        // The lock is released afterwards.
        manager.advance(&j1(), JobStatus::InTransit).await.unwrap();
    }

    #[tokio::test]
    async fn push_only_moves_forward() {
        let api = Arc::new(MockApi::default());
        let manager = manager(api);
        manager.upsert(job("J1", JobStatus::InTransit, Some("T1")));

        let stale = JobStatusChange {
            job_id: j1(),
            status: JobStatus::PickedUp,
        };
        let same = JobStatusChange {
            job_id: j1(),
            status: JobStatus::InTransit,
        };
        let ahead = JobStatusChange {
            job_id: j1(),
            status: JobStatus::Delivered,
        };
        assert!(!manager.apply_remote_status(&stale));
        assert!(!manager.apply_remote_status(&same));
        assert!(manager.apply_remote_status(&ahead));
        assert_eq!(manager.get(&j1()).unwrap().status, JobStatus::Delivered);
        assert!(!manager.apply_remote_status(&JobStatusChange {
            job_id: JobId::from("J404"),
            status: JobStatus::Completed,
        }));
    }

    #[tokio::test]
    async fn push_for_job_taken_elsewhere_removes_it() {
        let api = Arc::new(MockApi::default());
        let session = Arc::new(SessionStore::in_memory());
        session
            .login(Session::new(Actor::transporter("T2"), "tok"))
            .unwrap();
        let manager = DeliveryManager::new(api, session, Duration::from_secs(5));
        manager.upsert(job("J1", JobStatus::Available, None));
        manager.upsert(job("J2", JobStatus::Accepted, Some("T2")));

        assert!(manager.apply_remote_status(&JobStatusChange {
            job_id: j1(),
            status: JobStatus::Accepted,
        }));
        assert!(manager.get(&j1()).is_none());
        assert!(manager.available().is_empty());
        let active = manager.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, JobId::from("J2"));
        assert!(active.iter().all(DeliveryJob::assignment_consistent));
    }

    #[tokio::test]
    async fn farmer_keeps_unassigned_job_available_on_push() {
        let api = Arc::new(MockApi::default());
        let session = Arc::new(SessionStore::in_memory());
        session
            .login(Session::new(Actor::farmer("F1"), "tok"))
            .unwrap();
        let manager = DeliveryManager::new(api, session, Duration::from_secs(5));
        manager.upsert(job("J1", JobStatus::Available, None));

        assert!(!manager.apply_remote_status(&JobStatusChange {
            job_id: j1(),
            status: JobStatus::InTransit,
        }));
        let held = manager.get(&j1()).unwrap();
        assert_eq!(held.status, JobStatus::Available);
        assert!(held.assignment_consistent());
    }

    #[tokio::test(start_paused = true)]
    async fn own_accept_survives_its_status_push() {
        let api = Arc::new(MockApi::default());
        api.set_delay(Duration::from_secs(1));
        let manager = manager(api);
        manager.upsert(job("J1", JobStatus::Available, None));

        let id = j1();
        let t1 = Actor::transporter("T1");
        let (accepted, pushed) = tokio::join!(manager.accept_job(&id, &t1), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            manager.apply_remote_status(&JobStatusChange {
                job_id: id.clone(),
                status: JobStatus::Accepted,
            })
        });
        assert!(!pushed);
        let accepted = accepted.unwrap();
        assert_eq!(accepted.status, JobStatus::Accepted);
        assert_eq!(accepted.transporter.as_deref(), Some("T1"));
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_step_never_moves_backward() {
        let api = Arc::new(MockApi::default());
        api.set_delay(Duration::from_secs(1));
        let manager = manager(api);
        manager.upsert(job("J1", JobStatus::InTransit, Some("T1")));

        let id = j1();
        let (result, pushed) = tokio::join!(manager.advance(&id, JobStatus::Delivered), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            manager.apply_remote_status(&JobStatusChange {
                job_id: id.clone(),
                status: JobStatus::Completed,
            })
        });
        assert!(pushed);
        assert_eq!(result.unwrap().status, JobStatus::Completed);
        assert_eq!(manager.get(&id).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn load_partitions_jobs() {
        let api = Arc::new(MockApi::default());
        api.set_available(vec![job("A1", JobStatus::Available, None)]);
        api.set_mine(vec![
            job("M1", JobStatus::InTransit, Some("T1")),
            job("M2", JobStatus::Completed, Some("T1")),
            job("M3", JobStatus::Accepted, Some("T1")),
        ]);
        let manager = manager(api.clone());

        assert_eq!(manager.load().await.unwrap(), 4);
        let ids = |jobs: Vec<DeliveryJob>| jobs.into_iter().map(|j| j.id.to_string()).collect::<Vec<_>>();
        assert_eq!(ids(manager.available()), vec!["A1"]);
        assert_eq!(ids(manager.active()), vec!["M1", "M3"]);
        assert_eq!(ids(manager.completed()), vec!["M2"]);
        assert!(api.calls().contains(&"mine T1".to_string()));
    }

    #[tokio::test]
    async fn load_failure_keeps_previous_jobs() {
        let api = Arc::new(MockApi::default());
        api.fail("available", ApiError::Transport("offline".into()));
        let manager = manager(api);
        manager.upsert(job("J1", JobStatus::Accepted, Some("T1")));

        assert!(matches!(manager.load().await, Err(LifecycleError::Load(_))));
        assert!(manager.get(&j1()).is_some());
    }

    #[test]
    fn next_status_walks_the_lifecycle() {
        let path: Vec<JobStatus> =
            std::iter::successors(Some(JobStatus::Available), |s| next_status(*s)).collect();
        assert_eq!(path, JobStatus::ORDER.to_vec());
        assert_eq!(path.len() - 1, 5);
    }
}
