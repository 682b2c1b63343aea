//! Review packet and care plan: the human-approval artifacts.

use crate::ids::{PacketId, PlanId, RequestId, UserId};
use crate::status::{ApprovalStatus, PlanStatus};
use crate::task::CareTask;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The human-approval artifact assembled by the final pipeline stage.
///
/// Exists only after A5 succeeds; its `approval_status` is flipped to
/// `approved` exactly once by the approval gate and never reverts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPacket {
    /// Unique packet identifier.
    pub id: PacketId,

    /// Request this packet was generated for.
    pub care_request_id: RequestId,

    /// Plan name suggested by the pipeline, if any.
    pub suggested_plan_name: Option<String>,

    /// Executive summary of the generated plan.
    pub summary: String,

    /// Snapshot of the draft tasks awaiting approval.
    pub draft_tasks: Vec<CareTask>,

    /// Notes and rationale from the agent pipeline.
    pub agent_notes: String,

    /// Current approval status.
    pub approval_status: ApprovalStatus,

    /// When the packet was assembled.
    pub created_at: DateTime<Utc>,
}

/// An approved care plan, created by the approval gate.
///
/// The plan owner is the approver; reopening a completed task is reserved
/// to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarePlan {
    /// Unique plan identifier.
    pub id: PlanId,

    /// Request the plan answers.
    pub care_request_id: RequestId,

    /// User who approved the plan.
    pub owner: UserId,

    /// Human-readable plan name.
    pub name: String,

    /// Plan summary carried over from the review packet.
    pub summary: String,

    /// Plan status.
    pub status: PlanStatus,

    /// When the plan was created.
    pub created_at: DateTime<Utc>,
}
