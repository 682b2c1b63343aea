//! Background pipeline job tracking.

use crate::ids::{JobId, PacketId, RequestId};
use crate::status::JobStatus;
use crate::task::CareTask;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result payload stored on a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// The review packet produced by the pipeline.
    pub review_packet_id: PacketId,

    /// Plan summary from the packet.
    pub summary: String,

    /// Plan name suggested by the pipeline, if any.
    pub suggested_plan_name: Option<String>,

    /// Number of draft tasks generated.
    pub task_count: usize,

    /// The draft tasks, for convenient display while polling.
    pub tasks: Vec<CareTask>,
}

/// Tracks background execution of the agent pipeline for one care request.
///
/// Mutated only by the job runner. Terminal once status is completed or
/// failed. At most one non-terminal job exists per care request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,

    /// The request being processed.
    pub care_request_id: RequestId,

    /// Current job status.
    pub status: JobStatus,

    /// Stage currently executing (A1-A5), if running.
    pub current_stage: Option<String>,

    /// Per-stage progress: stage name to status string.
    ///
    /// Entries only gain or advance while the job runs; they are never
    /// removed or regressed.
    pub stage_progress: BTreeMap<String, String>,

    /// Result payload once completed.
    pub result: Option<JobResult>,

    /// Error message once failed.
    pub error: Option<String>,

    /// When execution started.
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new queued job for a request.
    pub fn new(care_request_id: RequestId) -> Self {
        Self {
            id: JobId::generate(),
            care_request_id,
            status: JobStatus::Queued,
            current_stage: None,
            stage_progress: BTreeMap::new(),
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Mark the job as running.
    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record stage progress.
    pub fn record_progress(&mut self, stage: impl Into<String>, progress: impl Into<String>) {
        let stage = stage.into();
        self.current_stage = Some(stage.clone());
        self.stage_progress.insert(stage, progress.into());
    }

    /// Mark the job as completed with its result.
    pub fn complete(&mut self, result: JobResult) {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.current_stage = None;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the job as failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.current_stage = None;
        self.completed_at = Some(Utc::now());
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
