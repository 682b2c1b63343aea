//! Task lifecycle: claiming, progressing, completing, releasing,
//! reopening.
//!
//! Legal transitions:
//!
//! | from      | event      | to        | actor      |
//! |-----------|------------|-----------|------------|
//! | available | claim      | claimed   | any helper |
//! | claimed   | add_status | claimed   | claimant   |
//! | claimed   | complete   | completed | claimant   |
//! | claimed   | release    | available | claimant   |
//! | completed | reopen     | claimed   | plan owner |
//!
//! Claim is a compare-and-swap on `available` inside the store's write
//! lock; racing helpers see exactly one winner. Every transition except
//! claim takes a non-empty text payload and appends exactly one diary
//! event inside the same lock scope as the status change.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use carecircle_core::{CareTask, CareTaskEvent, TaskId, TaskStatus, UserId};

use crate::error::EngineError;
use crate::store::Store;

/// Governs a task's state transitions and ownership after approval.
pub struct TaskLifecycle {
    store: Arc<Store>,
}

impl TaskLifecycle {
    /// Create a new lifecycle component.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Claim an available task for a helper.
    ///
    /// Succeeds only if the task is exactly `available` at the moment of
    /// the swap. A racing loser gets [`EngineError::TaskAlreadyClaimed`].
    /// Claiming writes no diary event; the diary records qualitative
    /// updates, not metadata changes.
    pub async fn claim(&self, task_id: &TaskId, helper: &UserId) -> Result<CareTask, EngineError> {
        let mut inner = self.store.write().await;
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EngineError::not_found("Care task", task_id))?;

        match task.status {
            TaskStatus::Available => {}
            TaskStatus::Claimed => return Err(EngineError::TaskAlreadyClaimed(task_id.clone())),
            from => {
                return Err(EngineError::InvalidTransition {
                    from,
                    to: TaskStatus::Claimed,
                })
            }
        }

        task.status = TaskStatus::Claimed;
        task.claimed_by = Some(helper.clone());
        task.claimed_at = Some(Utc::now());

        info!(task_id = %task_id, helper = %helper, "Task claimed");
        Ok(task.clone())
    }

    /// Record a progress note on a claimed task.
    pub async fn add_status(
        &self,
        task_id: &TaskId,
        helper: &UserId,
        note: &str,
    ) -> Result<CareTaskEvent, EngineError> {
        let note = require_payload(note, "status note")?;

        let mut inner = self.store.write().await;
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EngineError::not_found("Care task", task_id))?;
        expect_status(task, TaskStatus::Claimed)?;
        expect_claimant(task, helper, "add a status update to")?;

        let event = CareTaskEvent::status_update(task_id.clone(), note, helper.clone());
        inner
            .events
            .entry(task_id.clone())
            .or_default()
            .push(event.clone());
        Ok(event)
    }

    /// Complete a claimed task, recording the outcome.
    pub async fn complete(
        &self,
        task_id: &TaskId,
        helper: &UserId,
        outcome: &str,
    ) -> Result<CareTask, EngineError> {
        let outcome = require_payload(outcome, "outcome")?;

        let mut inner = self.store.write().await;
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EngineError::not_found("Care task", task_id))?;
        expect_status(task, TaskStatus::Claimed)?;
        expect_claimant(task, helper, "complete")?;

        task.status = TaskStatus::Completed;
        task.completed_at = Some(Utc::now());
        let snapshot = task.clone();

        let event = CareTaskEvent::completed(task_id.clone(), outcome, helper.clone());
        inner.events.entry(task_id.clone()).or_default().push(event);

        info!(task_id = %task_id, helper = %helper, "Task completed");
        Ok(snapshot)
    }

    /// Release a claimed task back to available, recording the reason.
    pub async fn release(
        &self,
        task_id: &TaskId,
        helper: &UserId,
        reason: &str,
    ) -> Result<CareTask, EngineError> {
        let reason = require_payload(reason, "release reason")?;

        let mut inner = self.store.write().await;
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EngineError::not_found("Care task", task_id))?;
        expect_status(task, TaskStatus::Claimed)?;
        expect_claimant(task, helper, "release")?;

        task.status = TaskStatus::Available;
        task.claimed_by = None;
        task.claimed_at = None;
        let snapshot = task.clone();

        let event = CareTaskEvent::released(task_id.clone(), reason, helper.clone());
        inner.events.entry(task_id.clone()).or_default().push(event);

        info!(task_id = %task_id, helper = %helper, "Task released");
        Ok(snapshot)
    }

    /// Reopen a completed task, re-assigning it to its prior claimant.
    /// Reserved to the owner of the plan the task belongs to.
    pub async fn reopen(
        &self,
        task_id: &TaskId,
        actor: &UserId,
        reason: &str,
    ) -> Result<CareTask, EngineError> {
        let reason = require_payload(reason, "reopen reason")?;

        let mut inner = self.store.write().await;
        let task = inner
            .tasks
            .get(task_id)
            .ok_or_else(|| EngineError::not_found("Care task", task_id))?;
        expect_status(task, TaskStatus::Completed)?;

        let owns_plan = task
            .care_plan_id
            .as_ref()
            .and_then(|plan_id| inner.plans.get(plan_id))
            .is_some_and(|plan| plan.owner == *actor);
        if !owns_plan {
            return Err(EngineError::ForbiddenTransition(
                "only the plan owner can reopen a completed task".to_owned(),
            ));
        }

        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EngineError::not_found("Care task", task_id))?;
        task.status = TaskStatus::Claimed;
        task.completed_at = None;
        // claimed_by and claimed_at stay: the task goes back to the same
        // helper.
        let snapshot = task.clone();

        let event = CareTaskEvent::reopened(task_id.clone(), reason, actor.clone());
        inner.events.entry(task_id.clone()).or_default().push(event);

        info!(task_id = %task_id, actor = %actor, "Task reopened");
        Ok(snapshot)
    }

    /// A task's diary in creation order.
    pub async fn diary(&self, task_id: &TaskId) -> Vec<CareTaskEvent> {
        self.store.diary(task_id).await
    }
}

fn require_payload<'a>(payload: &'a str, what: &str) -> Result<&'a str, EngineError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput(format!("{what} cannot be empty")));
    }
    Ok(trimmed)
}

fn expect_status(task: &CareTask, expected: TaskStatus) -> Result<(), EngineError> {
    if task.status != expected {
        return Err(EngineError::InvalidTransition {
            from: task.status,
            to: expected,
        });
    }
    Ok(())
}

fn expect_claimant(task: &CareTask, helper: &UserId, action: &str) -> Result<(), EngineError> {
    if task.claimed_by.as_ref() != Some(helper) {
        return Err(EngineError::ForbiddenTransition(format!(
            "only the current claimant can {action} this task"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use carecircle_core::{
        CarePlan, CareRequest, PlanId, PlanStatus, TaskEventType, TaskPriority,
    };

    /// Store with one available task belonging to a plan owned by
    /// "organizer".
    async fn seeded() -> (Arc<Store>, TaskLifecycle, TaskId, UserId) {
        let store = Store::new();
        let request = store
            .create_request(
                CareRequest::new("Mom needs help with meals after surgery.", None, None).unwrap(),
            )
            .await;

        let owner = UserId::new("organizer");
        let plan = CarePlan {
            id: PlanId::generate(),
            care_request_id: request.id.clone(),
            owner: owner.clone(),
            name: "Recovery plan".to_owned(),
            summary: "plan".to_owned(),
            status: PlanStatus::Approved,
            created_at: Utc::now(),
        };
        let mut task = CareTask::draft(
            request.id.clone(),
            "Cook dinner",
            "Weekday dinners",
            "meals",
            TaskPriority::High,
        );
        task.status = TaskStatus::Available;
        task.care_plan_id = Some(plan.id.clone());
        let task_id = task.id.clone();

        {
            let mut inner = store.write().await;
            inner.plans.insert(plan.id.clone(), plan);
            inner.tasks.insert(task_id.clone(), task);
        }

        let lifecycle = TaskLifecycle::new(store.clone());
        (store, lifecycle, task_id, owner)
    }

    #[tokio::test]
    async fn test_claim_sets_claimant_without_diary_entry() {
        let (_store, lifecycle, task_id, _) = seeded().await;
        let helper = UserId::new("helper-a");

        let task = lifecycle.claim(&task_id, &helper).await.unwrap();
        assert_eq!(task.status, TaskStatus::Claimed);
        assert_eq!(task.claimed_by, Some(helper));
        assert!(task.claimed_at.is_some());
        assert!(lifecycle.diary(&task_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let (store, lifecycle, task_id, _) = seeded().await;
        let lifecycle = Arc::new(lifecycle);
        let a = UserId::new("helper-a");
        let b = UserId::new("helper-b");

        let (res_a, res_b) = tokio::join!(
            lifecycle.claim(&task_id, &a),
            lifecycle.claim(&task_id, &b),
        );

        let (winner, loser) = match (res_a.is_ok(), res_b.is_ok()) {
            (true, false) => (a.clone(), res_b.unwrap_err()),
            (false, true) => (b.clone(), res_a.unwrap_err()),
            outcome => panic!("expected exactly one winner, got {outcome:?}"),
        };
        assert!(matches!(loser, EngineError::TaskAlreadyClaimed(_)));
        assert_eq!(
            store.get_task(&task_id).await.unwrap().claimed_by,
            Some(winner)
        );
    }

    #[tokio::test]
    async fn test_only_claimant_may_transition() {
        let (_store, lifecycle, task_id, _) = seeded().await;
        let helper = UserId::new("helper-a");
        let stranger = UserId::new("helper-b");
        lifecycle.claim(&task_id, &helper).await.unwrap();

        for result in [
            lifecycle.add_status(&task_id, &stranger, "note").await.err(),
            lifecycle.complete(&task_id, &stranger, "done").await.err(),
            lifecycle.release(&task_id, &stranger, "busy").await.err(),
        ] {
            assert!(matches!(result, Some(EngineError::ForbiddenTransition(_))));
        }
        // Status unchanged by the rejected attempts.
        assert_eq!(
            _store.get_task(&task_id).await.unwrap().status,
            TaskStatus::Claimed
        );
    }

    #[tokio::test]
    async fn test_empty_payload_rejected() {
        let (_store, lifecycle, task_id, _) = seeded().await;
        let helper = UserId::new("helper-a");
        lifecycle.claim(&task_id, &helper).await.unwrap();

        let err = lifecycle.add_status(&task_id, &helper, "   ").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert!(lifecycle.diary(&task_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_release_returns_task_to_available() {
        let (store, lifecycle, task_id, _) = seeded().await;
        let helper = UserId::new("helper-a");
        lifecycle.claim(&task_id, &helper).await.unwrap();

        let task = lifecycle
            .release(&task_id, &helper, "schedule conflict")
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Available);
        assert_eq!(task.claimed_by, None);
        assert_eq!(task.claimed_at, None);

        let diary = lifecycle.diary(&task_id).await;
        assert_eq!(diary.len(), 1);
        assert_eq!(diary[0].event_type, TaskEventType::Released);
        assert_eq!(diary[0].content, "schedule conflict");

        // Released task is claimable again, by anyone.
        let other = UserId::new("helper-b");
        assert!(lifecycle.claim(&task_id, &other).await.is_ok());
        assert_eq!(
            store.get_task(&task_id).await.unwrap().claimed_by,
            Some(other)
        );
    }

    #[tokio::test]
    async fn test_complete_then_reopen_preserves_claimant() {
        let (store, lifecycle, task_id, owner) = seeded().await;
        let helper = UserId::new("helper-a");

        lifecycle.claim(&task_id, &helper).await.unwrap();
        lifecycle.add_status(&task_id, &helper, "on my way").await.unwrap();
        lifecycle.complete(&task_id, &helper, "done").await.unwrap();

        // Only the plan owner may reopen.
        let err = lifecycle
            .reopen(&task_id, &helper, "wait, not yet")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ForbiddenTransition(_)));

        let task = lifecycle
            .reopen(&task_id, &owner, "needs more detail")
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Claimed);
        assert_eq!(task.claimed_by, Some(helper));
        assert_eq!(task.completed_at, None);

        let diary = store.diary(&task_id).await;
        let kinds: Vec<TaskEventType> = diary.iter().map(|event| event.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                TaskEventType::StatusUpdate,
                TaskEventType::Completed,
                TaskEventType::Reopened,
            ]
        );
        assert_eq!(
            diary
                .iter()
                .filter(|event| event.event_type == TaskEventType::Completed)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_transitions_outside_table_rejected() {
        let (_store, lifecycle, task_id, owner) = seeded().await;
        let helper = UserId::new("helper-a");

        // complete/release/add_status on an available task.
        assert!(matches!(
            lifecycle.complete(&task_id, &helper, "done").await.unwrap_err(),
            EngineError::InvalidTransition { .. }
        ));
        assert!(matches!(
            lifecycle.release(&task_id, &helper, "busy").await.unwrap_err(),
            EngineError::InvalidTransition { .. }
        ));

        // reopen on a task that is not completed.
        lifecycle.claim(&task_id, &helper).await.unwrap();
        assert!(matches!(
            lifecycle.reopen(&task_id, &owner, "why").await.unwrap_err(),
            EngineError::InvalidTransition { .. }
        ));

        // claim on a completed task.
        lifecycle.complete(&task_id, &helper, "done").await.unwrap();
        assert!(matches!(
            lifecycle.claim(&task_id, &helper).await.unwrap_err(),
            EngineError::InvalidTransition { .. }
        ));
    }
}
