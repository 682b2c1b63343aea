//! Approval gate: the single human-in-the-loop transition.
//!
//! Converts a pending review packet into an approved plan with claimable
//! tasks, exactly once. No task is ever claimable without passing through
//! this gate.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use carecircle_core::{
    ApprovalStatus, CarePlan, CareTask, PacketId, PlanId, PlanStatus, TaskId, TaskPriority,
    TaskStatus, UserId,
};

use crate::error::EngineError;
use crate::store::Store;

/// One task as edited by the reviewer.
///
/// Tasks carrying the id of one of the packet's drafts keep that
/// identity; tasks without an id are reviewer additions. Ids referencing
/// published or foreign tasks are rejected. Draft tasks the reviewer
/// omits are discarded, not hidden.
#[derive(Debug, Clone)]
pub struct TaskEdit {
    /// Draft task this edit applies to, if any.
    pub id: Option<TaskId>,

    /// Task title. Must be non-empty.
    pub title: String,

    /// Task description. Must be non-empty.
    pub description: String,

    /// Task category; defaults to "general" when blank.
    pub category: String,

    /// Priority as submitted. Must be one of "low", "medium", "high".
    pub priority: String,
}

/// Converts a draft plan's tasks from not-publishable to publishable.
pub struct ApprovalGate {
    store: Arc<Store>,
}

impl ApprovalGate {
    /// Create a new gate.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Approve a pending review packet with the reviewer's edited task
    /// list, producing an approved plan whose tasks are `available`.
    ///
    /// All-or-nothing: validation failures reject the whole call with the
    /// offending task indices and change nothing; a second approval of
    /// the same packet fails with [`EngineError::AlreadyApproved`] and
    /// changes nothing.
    pub async fn approve(
        &self,
        packet_id: &PacketId,
        approver: &UserId,
        plan_name: Option<String>,
        edited_tasks: Vec<TaskEdit>,
    ) -> Result<CarePlan, EngineError> {
        let validated = validate_edits(&edited_tasks)?;

        let mut inner = self.store.write().await;

        let packet = inner
            .packets
            .get(packet_id)
            .ok_or_else(|| EngineError::not_found("Review packet", packet_id))?;
        if packet.approval_status == ApprovalStatus::Approved {
            return Err(EngineError::AlreadyApproved(packet_id.clone()));
        }

        let request_id = packet.care_request_id.clone();

        // An edit id must reference a draft task of this packet's request.
        // Anything else (a published task, another request's draft, a
        // stale id) is rejected with the other validation failures.
        let stale: Vec<usize> = validated
            .iter()
            .enumerate()
            .filter(|(_, edit)| {
                edit.id.as_ref().is_some_and(|id| {
                    !inner.tasks.get(id).is_some_and(|task| {
                        task.status == TaskStatus::Draft && task.care_request_id == request_id
                    })
                })
            })
            .map(|(index, _)| index)
            .collect();
        if !stale.is_empty() {
            return Err(EngineError::Validation {
                indices: stale,
                reason: "task ids must reference draft tasks of this review packet".to_owned(),
            });
        }

        let name = plan_name
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
            .or_else(|| packet.suggested_plan_name.clone())
            .unwrap_or_else(|| "Care plan".to_owned());

        let plan = CarePlan {
            id: PlanId::generate(),
            care_request_id: request_id.clone(),
            owner: approver.clone(),
            name,
            summary: packet.summary.clone(),
            status: PlanStatus::Approved,
            created_at: Utc::now(),
        };

        // Publish the kept tasks: edits with a draft id update that task
        // in place; edits without one become new tasks.
        let mut kept: Vec<TaskId> = Vec::with_capacity(validated.len());
        for edit in validated {
            let task_id = match edit.id.clone() {
                Some(id) => id,
                None => {
                    let task = CareTask::draft(
                        request_id.clone(),
                        edit.title.clone(),
                        edit.description.clone(),
                        edit.category.clone(),
                        edit.priority,
                    );
                    let id = task.id.clone();
                    inner.tasks.insert(id.clone(), task);
                    id
                }
            };
            let task = inner
                .tasks
                .get_mut(&task_id)
                .ok_or_else(|| EngineError::not_found("Care task", &task_id))?;
            task.title = edit.title;
            task.description = edit.description;
            task.category = edit.category;
            task.priority = edit.priority;
            task.care_plan_id = Some(plan.id.clone());
            task.status = TaskStatus::Available;
            kept.push(task_id);
        }

        // Drafts the reviewer omitted are discarded, not hidden.
        inner.tasks.retain(|id, task| {
            task.care_request_id != request_id
                || task.status != TaskStatus::Draft
                || kept.contains(id)
        });

        if let Some(packet) = inner.packets.get_mut(packet_id) {
            packet.approval_status = ApprovalStatus::Approved;
        }
        inner.plans.insert(plan.id.clone(), plan.clone());

        info!(
            packet_id = %packet_id,
            plan_id = %plan.id,
            approver = %approver,
            task_count = kept.len(),
            "Review packet approved"
        );
        Ok(plan)
    }
}

/// A task edit that passed validation, with its priority parsed.
struct ValidatedEdit {
    id: Option<TaskId>,
    title: String,
    description: String,
    category: String,
    priority: TaskPriority,
}

/// Validate every edit before any mutation. Offending indices are
/// collected and reported together.
fn validate_edits(edits: &[TaskEdit]) -> Result<Vec<ValidatedEdit>, EngineError> {
    let mut offenders = Vec::new();
    let mut validated = Vec::with_capacity(edits.len());

    for (index, edit) in edits.iter().enumerate() {
        let title = edit.title.trim();
        let description = edit.description.trim();
        let priority = match edit.priority.as_str() {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            _ => None,
        };

        match (title.is_empty(), description.is_empty(), priority) {
            (false, false, Some(priority)) => {
                let category = edit.category.trim();
                validated.push(ValidatedEdit {
                    id: edit.id.clone(),
                    title: title.to_owned(),
                    description: description.to_owned(),
                    category: if category.is_empty() {
                        "general".to_owned()
                    } else {
                        category.to_lowercase()
                    },
                    priority,
                });
            }
            _ => offenders.push(index),
        }
    }

    if offenders.is_empty() {
        Ok(validated)
    } else {
        Err(EngineError::Validation {
            indices: offenders,
            reason: "each task needs a non-empty title, a non-empty description, and a priority of low, medium, or high".to_owned(),
        })
    }
}
