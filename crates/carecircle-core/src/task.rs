//! Care task: an actionable unit of work for helpers.

use crate::ids::{PlanId, RequestId, TaskId, UserId};
use crate::status::{TaskPriority, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An actionable unit of work generated by the pipeline and, once
/// approved, claimable by helpers.
///
/// Content (title, description, category, priority) is owned by the
/// pipeline while the task is a draft and frozen after approval. Status
/// and claimant are owned by the task lifecycle after approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareTask {
    /// Unique task identifier.
    pub id: TaskId,

    /// Plan this task belongs to, set by the approval gate.
    pub care_plan_id: Option<PlanId>,

    /// Request this task originated from.
    pub care_request_id: RequestId,

    /// Short, clear task title.
    pub title: String,

    /// Detailed task description.
    pub description: String,

    /// Task category (e.g. meals, transportation, medical).
    pub category: String,

    /// Task priority level.
    pub priority: TaskPriority,

    /// Current lifecycle status.
    pub status: TaskStatus,

    /// Helper currently holding the task, if claimed.
    pub claimed_by: Option<UserId>,

    /// When the task was last claimed.
    pub claimed_at: Option<DateTime<Utc>>,

    /// When the task was completed.
    pub completed_at: Option<DateTime<Utc>>,

    /// When the task was created.
    pub created_at: DateTime<Utc>,
}

impl CareTask {
    /// Create a new draft task for a request.
    pub fn draft(
        care_request_id: RequestId,
        title: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        priority: TaskPriority,
    ) -> Self {
        Self {
            id: TaskId::generate(),
            care_plan_id: None,
            care_request_id,
            title: title.into(),
            description: description.into(),
            category: category.into(),
            priority,
            status: TaskStatus::Draft,
            claimed_by: None,
            claimed_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Builder method to set a specific ID (useful for testing and for
    /// preserving identity across pipeline revisions).
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    /// Check if the task has finished its lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed)
    }
}
