//! Status enums for requests, jobs, tasks, plans, and review packets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a background pipeline Job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job created but execution has not started yet.
    #[default]
    Queued,
    /// Pipeline is executing.
    Running,
    /// Pipeline finished and produced a review packet.
    Completed,
    /// Pipeline failed; see the job's error field.
    Failed,
}

impl JobStatus {
    /// Returns true if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Status of a CareRequest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Submitted, not yet picked up (or reverted after a failed job).
    #[default]
    Submitted,
    /// A job is currently processing this request.
    Processing,
    /// The pipeline produced a review packet for this request.
    Completed,
}

/// Status of a CareTask through its lifecycle.
///
/// The legacy `active` value is accepted on read as an alias of `claimed`
/// and is never written back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Generated by the pipeline, not yet approved. Not visible to helpers.
    #[default]
    Draft,
    /// Approved and claimable by any helper.
    Available,
    /// Owned by a helper.
    #[serde(alias = "active")]
    Claimed,
    /// Finished by its claimant.
    Completed,
}

impl TaskStatus {
    /// Returns true once the task has passed the approval gate.
    pub fn is_published(&self) -> bool {
        !matches!(self, Self::Draft)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Available => "available",
            Self::Claimed => "claimed",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Priority of a CareTask. Ordered so that `High` sorts greatest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    /// Map free-form priority text from the agent to a priority level.
    ///
    /// Substring match on "high"/"low"; anything else is medium.
    pub fn from_agent_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("high") {
            Self::High
        } else if lower.contains("low") {
            Self::Low
        } else {
            Self::Medium
        }
    }
}

/// Approval status of a ReviewPacket. Never reverts once approved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
}

/// Status of a CarePlan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Draft,
    Approved,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_priority_from_agent_text() {
        assert_eq!(TaskPriority::from_agent_text("High priority"), TaskPriority::High);
        assert_eq!(TaskPriority::from_agent_text("low"), TaskPriority::Low);
        assert_eq!(TaskPriority::from_agent_text("urgent"), TaskPriority::Medium);
    }

    #[test]
    fn test_legacy_active_status_reads_as_claimed() {
        let status: TaskStatus = serde_json::from_str("\"active\"").unwrap();
        assert_eq!(status, TaskStatus::Claimed);
        // Canonical form is always written back.
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"claimed\"");
    }
}
