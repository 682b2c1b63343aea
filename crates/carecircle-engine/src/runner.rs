//! Background job runner.
//!
//! One spawned task per submitted job, independent of the caller's
//! request cycle. Callers observe execution via non-blocking status
//! polls; failures never cross the async boundary — they land in the
//! job's terminal state.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use carecircle_core::{Job, JobId, JobResult, RequestId, RequestStatus};

use crate::error::EngineError;
use crate::pipeline::{PipelineOrchestrator, ProgressSink};
use crate::stage::Stage;
use crate::store::Store;

/// Manages background execution of care request processing jobs.
pub struct JobRunner {
    store: Arc<Store>,
    orchestrator: Arc<PipelineOrchestrator>,
}

impl JobRunner {
    /// Create a new runner.
    pub fn new(store: Arc<Store>, orchestrator: Arc<PipelineOrchestrator>) -> Arc<Self> {
        Arc::new(Self {
            store,
            orchestrator,
        })
    }

    /// Enqueue a job for a stored care request and schedule its
    /// execution.
    ///
    /// Fails with [`EngineError::JobConflict`] if a non-terminal job
    /// already exists for the request; the conflicting call enqueues
    /// nothing. On success the request moves to `processing`.
    pub async fn submit(self: &Arc<Self>, request_id: &RequestId) -> Result<Job, EngineError> {
        let job = self.store.submit_job(request_id).await?;

        let runner = Arc::clone(self);
        let job_id = job.id.clone();
        tokio::spawn(async move {
            runner.execute(job_id).await;
        });

        Ok(job)
    }

    /// Latest known state of a job. Never blocks on the running pipeline.
    pub async fn get_status(&self, job_id: &JobId) -> Result<Job, EngineError> {
        self.store
            .get_job(job_id)
            .await
            .ok_or_else(|| EngineError::not_found("Job", job_id))
    }

    /// Diagnostic enumeration of all jobs.
    pub async fn list_jobs(&self) -> Vec<Job> {
        self.store.list_jobs().await
    }

    /// Drive one job to a terminal state. All failures are captured into
    /// the job record; nothing propagates out of the spawned task.
    async fn execute(&self, job_id: JobId) {
        let Ok(job) = self.get_status(&job_id).await else {
            error!(job_id = %job_id, "Job disappeared before execution");
            return;
        };
        let Some(request) = self.store.get_request(&job.care_request_id).await else {
            let message = format!("care request {} not found", job.care_request_id);
            error!(job_id = %job_id, "{message}");
            let _ = self.store.update_job(&job_id, |job| job.fail(&message)).await;
            return;
        };

        if let Err(err) = self.store.update_job(&job_id, Job::start).await {
            error!(job_id = %job_id, error = %err, "Failed to start job");
            return;
        }
        info!(job_id = %job_id, care_request_id = %request.id, "Job execution started");

        let progress = JobProgress {
            store: Arc::clone(&self.store),
            job_id: job_id.clone(),
        };

        match self.orchestrator.run(&request, &progress).await {
            Ok(packet) => {
                let result = JobResult {
                    review_packet_id: packet.id.clone(),
                    summary: packet.summary.clone(),
                    suggested_plan_name: packet.suggested_plan_name.clone(),
                    task_count: packet.draft_tasks.len(),
                    tasks: packet.draft_tasks.clone(),
                };
                let _ = self
                    .store
                    .update_job(&job_id, |job| job.complete(result))
                    .await;
                self.store
                    .set_request_status(&request.id, RequestStatus::Completed)
                    .await;
                info!(
                    job_id = %job_id,
                    task_count = packet.draft_tasks.len(),
                    "Job completed"
                );
            }
            Err(err) => {
                let message = format!("Job execution failed: {err}");
                error!(job_id = %job_id, error = %err, "Job failed");
                let _ = self
                    .store
                    .update_job(&job_id, |job| job.fail(&message))
                    .await;
                // Reset so the caller can resubmit; no automatic retry.
                self.store
                    .set_request_status(&request.id, RequestStatus::Submitted)
                    .await;
            }
        }
    }
}

/// Progress sink that writes stage progress onto the job record, so a
/// concurrent status poll observes partial progress.
struct JobProgress {
    store: Arc<Store>,
    job_id: JobId,
}

#[async_trait]
impl ProgressSink for JobProgress {
    async fn stage_progress(&self, stage: Stage, status: &str) {
        info!(job_id = %self.job_id, stage = %stage, status, "Stage progress");
        let _ = self
            .store
            .update_job(&self.job_id, |job| job.record_progress(stage.name(), status))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::stage::testing::ScriptedExecutor;
    use carecircle_core::{CareRequest, JobStatus};
    use std::time::Duration;

    fn happy_executor() -> ScriptedExecutor {
        ScriptedExecutor::new()
            .respond(
                Stage::A1,
                r#"{"summary": "Recovery support", "identified_needs": {"meals": ["dinners"]}}"#,
            )
            .respond(
                Stage::A2,
                r#"[{"title": "Cook dinner", "description": "Weekday dinners", "category": "meals", "priority": "high"}]"#,
            )
            .respond(
                Stage::A3,
                r#"{"tasks": [{"title": "Cook dinner", "description": "Weekday dinners", "category": "meals", "priority": "high"}]}"#,
            )
            .respond(
                Stage::A4,
                r#"{"tasks": [{"title": "Cook dinner", "description": "Weekday dinners", "category": "meals", "priority": "high"}]}"#,
            )
            .respond(
                Stage::A5,
                r#"{"summary": "One task", "suggested_plan_name": "Recovery", "agent_notes": "ok"}"#,
            )
    }

    fn runner_with(executor: ScriptedExecutor) -> (Arc<Store>, Arc<JobRunner>) {
        let store = Store::new();
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            store.clone(),
            Arc::new(executor),
            EngineConfig::default(),
        ));
        let runner = JobRunner::new(store.clone(), orchestrator);
        (store, runner)
    }

    async fn poll_terminal(runner: &JobRunner, job_id: &JobId) -> Job {
        for _ in 0..200 {
            let job = runner.get_status(job_id).await.unwrap();
            if job.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn test_successful_run_completes_job_and_request() {
        let (store, runner) = runner_with(happy_executor());
        let request = store
            .create_request(
                CareRequest::new("Mom needs help with meals after surgery.", None, None).unwrap(),
            )
            .await;

        let job = runner.submit(&request.id).await.unwrap();
        let done = poll_terminal(&runner, &job.id).await;

        assert_eq!(done.status, JobStatus::Completed);
        let result = done.result.unwrap();
        assert_eq!(result.task_count, 1);
        assert_eq!(result.suggested_plan_name.as_deref(), Some("Recovery"));
        assert_eq!(
            done.stage_progress.get("A5").map(String::as_str),
            Some("completed")
        );
        assert_eq!(
            store.get_request(&request.id).await.unwrap().status,
            RequestStatus::Completed
        );
        assert!(store
            .get_review_packet(&result.review_packet_id)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_short_narrative_fails_job_and_resets_request() {
        let (store, runner) = runner_with(ScriptedExecutor::new());
        let request = store
            .create_request(CareRequest::new("Ten chars.", None, None).unwrap())
            .await;

        let job = runner.submit(&request.id).await.unwrap();
        let done = poll_terminal(&runner, &job.id).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.unwrap().contains("Insufficient input"));
        assert!(done.result.is_none());
        assert_eq!(
            store.get_request(&request.id).await.unwrap().status,
            RequestStatus::Submitted
        );
    }

    #[tokio::test]
    async fn test_duplicate_submit_conflicts_while_running() {
        let (store, runner) = runner_with(happy_executor());
        let request = store
            .create_request(
                CareRequest::new("Mom needs help with meals after surgery.", None, None).unwrap(),
            )
            .await;

        let job = runner.submit(&request.id).await.unwrap();
        let err = runner.submit(&request.id).await.unwrap_err();
        assert!(matches!(err, EngineError::JobConflict(_)));
        assert_eq!(runner.list_jobs().await.len(), 1);

        // After the first job terminates, a fresh submission is allowed.
        poll_terminal(&runner, &job.id).await;
        // The request is now completed; resubmission of the same request
        // is a caller decision, and the index permits it.
        assert!(runner.submit(&request.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_stage_error_is_polled_not_raised() {
        let executor = ScriptedExecutor::new().fail(Stage::A1, "model offline");
        let (store, runner) = runner_with(executor);
        let request = store
            .create_request(
                CareRequest::new("Mom needs help with meals after surgery.", None, None).unwrap(),
            )
            .await;

        // submit returns immediately and without error.
        let job = runner.submit(&request.id).await.unwrap();
        let done = poll_terminal(&runner, &job.id).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.unwrap().contains("model offline"));
        assert_eq!(
            done.stage_progress.get("A1").map(String::as_str),
            Some("running")
        );
    }
}
