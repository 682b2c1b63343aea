//! Task lifecycle events: the append-only diary.

use crate::ids::{EventId, TaskId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lifecycle event recorded against one task.
///
/// Events are append-only: never updated or deleted. Ordered by creation
/// time per task, they form the task's diary. Claiming records no event;
/// the diary captures qualitative human updates, not metadata changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareTaskEvent {
    /// Unique event identifier.
    pub id: EventId,

    /// Task this event belongs to.
    pub care_task_id: TaskId,

    /// Type of event.
    pub event_type: TaskEventType,

    /// Free-text payload recorded verbatim from the actor.
    pub content: String,

    /// Who authored the event.
    pub author: UserId,

    /// When the event occurred.
    pub created_at: DateTime<Utc>,
}

impl CareTaskEvent {
    fn new(
        care_task_id: TaskId,
        event_type: TaskEventType,
        content: impl Into<String>,
        author: UserId,
    ) -> Self {
        Self {
            id: EventId::generate(),
            care_task_id,
            event_type,
            content: content.into(),
            author,
            created_at: Utc::now(),
        }
    }

    /// Create a progress note from the current claimant.
    pub fn status_update(task_id: TaskId, note: impl Into<String>, author: UserId) -> Self {
        Self::new(task_id, TaskEventType::StatusUpdate, note, author)
    }

    /// Create a completion event with the outcome text.
    pub fn completed(task_id: TaskId, outcome: impl Into<String>, author: UserId) -> Self {
        Self::new(task_id, TaskEventType::Completed, outcome, author)
    }

    /// Create a release event with the reason the claimant stepped back.
    pub fn released(task_id: TaskId, reason: impl Into<String>, author: UserId) -> Self {
        Self::new(task_id, TaskEventType::Released, reason, author)
    }

    /// Create a reopen event with the plan owner's reason.
    pub fn reopened(task_id: TaskId, reason: impl Into<String>, author: UserId) -> Self {
        Self::new(task_id, TaskEventType::Reopened, reason, author)
    }
}

/// Type of task lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventType {
    /// Progress note while the task is claimed.
    StatusUpdate,
    /// Task completed by its claimant.
    Completed,
    /// Task released back to available.
    Released,
    /// Completed task reopened by the plan owner.
    Reopened,
}
