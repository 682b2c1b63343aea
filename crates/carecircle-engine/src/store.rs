//! In-memory backing store: the single source of truth.
//!
//! All records live in maps behind one `RwLock`. Every state-changing
//! operation runs inside a single write-lock scope, so a transition and
//! the diary entry it produces commit together, and check-and-set
//! operations (job submission, task claim) are atomic rather than
//! read-then-write pairs.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::info;

use carecircle_core::{
    CarePlan, CareRequest, CareTask, CareTaskEvent, Job, JobId, NeedsMap, PacketId, PlanId,
    RequestId, RequestStatus, ReviewPacket, TaskId, TaskStatus, UserId,
};

use crate::error::EngineError;

/// Record maps. Components mutate these only through [`Store`], inside a
/// single write-lock scope per operation.
#[derive(Default)]
pub(crate) struct StoreInner {
    pub requests: HashMap<RequestId, CareRequest>,
    pub jobs: HashMap<JobId, Job>,
    /// Submission index: at most one non-terminal job per request.
    pub job_by_request: HashMap<RequestId, JobId>,
    pub needs_maps: HashMap<RequestId, NeedsMap>,
    pub tasks: HashMap<TaskId, CareTask>,
    pub packets: HashMap<PacketId, ReviewPacket>,
    pub plans: HashMap<PlanId, CarePlan>,
    /// Per-task diary, append-only, in creation order.
    pub events: HashMap<TaskId, Vec<CareTaskEvent>>,
}

/// The backing store.
pub struct Store {
    inner: RwLock<StoreInner>,
}

impl Store {
    /// Create an empty store wrapped in Arc.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(StoreInner::default()),
        })
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().await
    }

    // ---- care requests ----

    /// Persist a newly submitted care request.
    pub async fn create_request(&self, request: CareRequest) -> CareRequest {
        let mut inner = self.inner.write().await;
        inner.requests.insert(request.id.clone(), request.clone());
        request
    }

    /// Fetch a care request.
    pub async fn get_request(&self, id: &RequestId) -> Option<CareRequest> {
        self.inner.read().await.requests.get(id).cloned()
    }

    pub(crate) async fn set_request_status(&self, id: &RequestId, status: RequestStatus) {
        let mut inner = self.inner.write().await;
        if let Some(request) = inner.requests.get_mut(id) {
            request.status = status;
        }
    }

    // ---- jobs ----

    /// Submit-if-absent: create a queued job for the request unless a
    /// non-terminal job already exists for it.
    ///
    /// The conflict check and the insert happen under one write lock, so
    /// two racing submissions cannot both enqueue.
    pub async fn submit_job(&self, request_id: &RequestId) -> Result<Job, EngineError> {
        let mut inner = self.inner.write().await;

        if !inner.requests.contains_key(request_id) {
            return Err(EngineError::not_found("Care request", request_id));
        }

        if let Some(existing_id) = inner.job_by_request.get(request_id) {
            let existing = inner.jobs.get(existing_id);
            if existing.is_some_and(|job| !job.is_terminal()) {
                return Err(EngineError::JobConflict(request_id.clone()));
            }
        }

        let job = Job::new(request_id.clone());
        inner.job_by_request.insert(request_id.clone(), job.id.clone());
        inner.jobs.insert(job.id.clone(), job.clone());
        if let Some(request) = inner.requests.get_mut(request_id) {
            request.status = RequestStatus::Processing;
        }

        info!(job_id = %job.id, care_request_id = %request_id, "Job enqueued");
        Ok(job)
    }

    /// Apply a mutation to a job.
    pub(crate) async fn update_job(
        &self,
        id: &JobId,
        f: impl FnOnce(&mut Job),
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| EngineError::not_found("Job", id))?;
        f(job);
        Ok(())
    }

    /// Fetch the latest known state of a job. Never blocks on execution.
    pub async fn get_job(&self, id: &JobId) -> Option<Job> {
        self.inner.read().await.jobs.get(id).cloned()
    }

    /// Diagnostic enumeration of all jobs.
    pub async fn list_jobs(&self) -> Vec<Job> {
        self.inner.read().await.jobs.values().cloned().collect()
    }

    // ---- pipeline artifacts ----

    /// Persist a needs map, replacing any prior map for the same request.
    pub(crate) async fn put_needs_map(&self, map: NeedsMap) {
        let mut inner = self.inner.write().await;
        inner.needs_maps.insert(map.care_request_id.clone(), map);
    }

    /// Fetch the needs map for a request.
    pub async fn get_needs_map(&self, request_id: &RequestId) -> Option<NeedsMap> {
        self.inner.read().await.needs_maps.get(request_id).cloned()
    }

    /// Replace the draft tasks for a request. Published tasks (anything
    /// past the approval gate) are left untouched; a re-run only
    /// overwrites its own draft output.
    pub(crate) async fn replace_draft_tasks(&self, request_id: &RequestId, tasks: Vec<CareTask>) {
        let mut inner = self.inner.write().await;
        inner.tasks.retain(|_, task| {
            task.care_request_id != *request_id || task.status != TaskStatus::Draft
        });
        for task in tasks {
            inner.tasks.insert(task.id.clone(), task);
        }
    }

    /// Persist a review packet, dropping any prior pending packet for the
    /// same request (idempotent re-run).
    pub(crate) async fn put_review_packet(&self, packet: ReviewPacket) {
        let mut inner = self.inner.write().await;
        inner.packets.retain(|_, existing| {
            existing.care_request_id != packet.care_request_id
                || existing.approval_status != carecircle_core::ApprovalStatus::Pending
        });
        inner.packets.insert(packet.id.clone(), packet);
    }

    /// Fetch a review packet.
    pub async fn get_review_packet(&self, id: &PacketId) -> Option<ReviewPacket> {
        self.inner.read().await.packets.get(id).cloned()
    }

    /// Fetch a care plan.
    pub async fn get_plan(&self, id: &PlanId) -> Option<CarePlan> {
        self.inner.read().await.plans.get(id).cloned()
    }

    // ---- tasks ----

    /// Fetch a task.
    pub async fn get_task(&self, id: &TaskId) -> Option<CareTask> {
        self.inner.read().await.tasks.get(id).cloned()
    }

    /// All tasks in a plan, highest priority first.
    pub async fn tasks_by_plan(&self, plan_id: &PlanId) -> Vec<CareTask> {
        let inner = self.inner.read().await;
        let mut tasks: Vec<CareTask> = inner
            .tasks
            .values()
            .filter(|task| task.care_plan_id.as_ref() == Some(plan_id))
            .cloned()
            .collect();
        sort_tasks(&mut tasks);
        tasks
    }

    /// All tasks currently claimed by (or completed by) a helper.
    pub async fn tasks_by_claimant(&self, user: &UserId) -> Vec<CareTask> {
        let inner = self.inner.read().await;
        let mut tasks: Vec<CareTask> = inner
            .tasks
            .values()
            .filter(|task| task.claimed_by.as_ref() == Some(user))
            .cloned()
            .collect();
        sort_tasks(&mut tasks);
        tasks
    }

    /// All tasks open for claiming.
    pub async fn available_tasks(&self) -> Vec<CareTask> {
        let inner = self.inner.read().await;
        let mut tasks: Vec<CareTask> = inner
            .tasks
            .values()
            .filter(|task| task.status == TaskStatus::Available)
            .cloned()
            .collect();
        sort_tasks(&mut tasks);
        tasks
    }

    // ---- diary ----

    /// A task's diary: its lifecycle events in creation order.
    pub async fn diary(&self, task_id: &TaskId) -> Vec<CareTaskEvent> {
        self.inner
            .read()
            .await
            .events
            .get(task_id)
            .cloned()
            .unwrap_or_default()
    }
}

fn sort_tasks(tasks: &mut [CareTask]) {
    tasks.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}
