//! Pipeline orchestrator: runs the five fixed stages against one request.
//!
//! Stage order is strict: A1 -> A2 -> A3 -> A4 -> A5. Each stage's
//! artifact is persisted before the next stage starts. A4 is the one
//! optional stage: its failure is caught and A3's output passes through
//! unchanged. A re-run for the same request idempotently replaces the
//! prior needs map and draft tasks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use carecircle_core::{
    ApprovalStatus, CareRequest, CareTask, NeedsMap, PacketId, ReviewPacket, TaskPriority,
};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::stage::{
    extract_json, NeedsMapPayload, ReviewPacketPayload, RevisedTasksPayload, Stage, StageContext,
    StageExecutor, TaskListPayload, TaskPayload,
};
use crate::store::Store;

/// Observer for per-stage progress, fed back into the job's progress map
/// so concurrent status polls see partial progress.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Record that `stage` is now in `status` ("running", "completed",
    /// "skipped").
    async fn stage_progress(&self, stage: Stage, status: &str);
}

/// Orchestrates the sequential execution of the agent pipeline.
pub struct PipelineOrchestrator {
    store: Arc<Store>,
    executor: Arc<dyn StageExecutor>,
    config: EngineConfig,
}

impl PipelineOrchestrator {
    /// Create a new orchestrator.
    pub fn new(store: Arc<Store>, executor: Arc<dyn StageExecutor>, config: EngineConfig) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    /// Execute the complete pipeline for one care request.
    ///
    /// Returns the assembled review packet, which exists only once A5 has
    /// succeeded. Failures in A1/A2/A3/A5 propagate and are fatal to the
    /// caller's job.
    pub async fn run(
        &self,
        request: &CareRequest,
        progress: &dyn ProgressSink,
    ) -> Result<ReviewPacket, EngineError> {
        let started = Utc::now();
        info!(care_request_id = %request.id, "Starting agent pipeline");

        let ctx = StageContext {
            constraints: request.constraints.clone(),
            boundaries: request.boundaries.clone(),
        };

        progress.stage_progress(Stage::A1, "running").await;
        let needs_map = self.stage_a1(request, &ctx).await?;
        self.store.put_needs_map(needs_map.clone()).await;
        progress.stage_progress(Stage::A1, "completed").await;

        progress.stage_progress(Stage::A2, "running").await;
        let draft_tasks = self.stage_a2(request, &needs_map, &ctx).await?;
        self.store
            .replace_draft_tasks(&request.id, draft_tasks.clone())
            .await;
        progress.stage_progress(Stage::A2, "completed").await;

        progress.stage_progress(Stage::A3, "running").await;
        let (reviewed_tasks, review_notes) = self.stage_a3(request, &draft_tasks, &ctx).await?;
        self.store
            .replace_draft_tasks(&request.id, reviewed_tasks.clone())
            .await;
        progress.stage_progress(Stage::A3, "completed").await;

        // A4 is recoverable: on any failure the guardian's output passes
        // through unchanged.
        let final_tasks = if self.config.run_optimization {
            progress.stage_progress(Stage::A4, "running").await;
            match self.stage_a4(request, &reviewed_tasks, &ctx).await {
                Ok(optimized) => {
                    self.store
                        .replace_draft_tasks(&request.id, optimized.clone())
                        .await;
                    progress.stage_progress(Stage::A4, "completed").await;
                    optimized
                }
                Err(err) => {
                    warn!(
                        care_request_id = %request.id,
                        error = %err,
                        "Optimization stage failed; continuing with guardian output"
                    );
                    progress.stage_progress(Stage::A4, "skipped").await;
                    reviewed_tasks
                }
            }
        } else {
            progress.stage_progress(Stage::A4, "skipped").await;
            reviewed_tasks
        };

        progress.stage_progress(Stage::A5, "running").await;
        let packet = self
            .stage_a5(request, &final_tasks, &needs_map, review_notes)
            .await?;
        self.store
            .replace_draft_tasks(&request.id, packet.draft_tasks.clone())
            .await;
        self.store.put_review_packet(packet.clone()).await;
        progress.stage_progress(Stage::A5, "completed").await;

        let elapsed = Utc::now() - started;
        info!(
            care_request_id = %request.id,
            task_count = packet.draft_tasks.len(),
            elapsed_ms = elapsed.num_milliseconds(),
            "Pipeline completed"
        );
        Ok(packet)
    }

    /// A1: Intake & needs analysis.
    async fn stage_a1(
        &self,
        request: &CareRequest,
        ctx: &StageContext,
    ) -> Result<NeedsMap, EngineError> {
        info!(stage = %Stage::A1, "Executing {}", Stage::A1.title());

        let narrative_chars = request.narrative.chars().count();
        if narrative_chars < self.config.min_narrative_len {
            return Err(EngineError::InsufficientInput(format!(
                "narrative is too short to analyze ({narrative_chars} chars, minimum {})",
                self.config.min_narrative_len
            )));
        }

        let input = format!(
            "Care Request ID: {}\n\nNARRATIVE:\n{}\n\nCONSTRAINTS:\n{}\n\nBOUNDARIES:\n{}\n",
            request.id,
            request.narrative,
            ctx.constraints_text(),
            ctx.boundaries_text(),
        );

        let response = self.call_stage(Stage::A1, &input, ctx).await?;
        let payload: NeedsMapPayload = parse_payload(Stage::A1, &response)?;

        let needs_map = NeedsMap {
            care_request_id: request.id.clone(),
            summary: payload.summary,
            identified_needs: payload.identified_needs,
            risks: payload.risks,
            assumptions: payload.assumptions,
            created_at: Utc::now(),
        };

        if !needs_map.is_structurally_valid() {
            return Err(EngineError::stage(
                Stage::A1,
                "needs map must have a non-empty summary and at least one need category",
            ));
        }

        Ok(needs_map)
    }

    /// A2: Task generation.
    async fn stage_a2(
        &self,
        request: &CareRequest,
        needs_map: &NeedsMap,
        ctx: &StageContext,
    ) -> Result<Vec<CareTask>, EngineError> {
        info!(stage = %Stage::A2, "Executing {}", Stage::A2.title());

        let input = format!(
            "SUMMARY:\n{}\n\nIDENTIFIED NEEDS:\n{}\n\nRISKS:\n{}\n\nASSUMPTIONS:\n{}\n\nCare Request ID: {}\n",
            needs_map.summary,
            serde_json::to_string_pretty(&needs_map.identified_needs).unwrap_or_default(),
            serde_json::to_string_pretty(&needs_map.risks).unwrap_or_default(),
            needs_map.assumptions,
            request.id,
        );

        let response = self.call_stage(Stage::A2, &input, ctx).await?;
        let payload: TaskListPayload = parse_payload(Stage::A2, &response)?;
        let tasks = materialize_tasks(request, payload.into_tasks(), &[]);

        if tasks.is_empty() {
            return Err(EngineError::stage(Stage::A2, "no valid tasks in response"));
        }

        info!(stage = %Stage::A2, count = tasks.len(), "Generated draft tasks");
        Ok(tasks)
    }

    /// A3: Guardian & quality pass. May drop tasks for safety, never add
    /// or merge them.
    async fn stage_a3(
        &self,
        request: &CareRequest,
        draft_tasks: &[CareTask],
        ctx: &StageContext,
    ) -> Result<(Vec<CareTask>, String), EngineError> {
        info!(stage = %Stage::A3, "Executing {}", Stage::A3.title());

        let narrative_preview: String = request.narrative.chars().take(200).collect();
        let input = format!(
            "Draft Tasks to Review ({} tasks):\n{}\n\nOriginal Care Request Context:\n- Narrative: {}\n- Constraints: {}\n- Boundaries: {}\n",
            draft_tasks.len(),
            tasks_as_json(draft_tasks),
            narrative_preview,
            ctx.constraints_text(),
            ctx.boundaries_text(),
        );

        let response = self.call_stage(Stage::A3, &input, ctx).await?;
        let payload: RevisedTasksPayload = parse_payload(Stage::A3, &response)?;
        let notes = payload.review_notes.clone();
        let tasks = materialize_tasks(request, payload.tasks, draft_tasks);

        if tasks.is_empty() {
            return Err(EngineError::stage(Stage::A3, "no valid tasks in response"));
        }
        if tasks.len() > draft_tasks.len() {
            return Err(EngineError::stage(
                Stage::A3,
                format!(
                    "guardian returned {} tasks for {} drafts; it may drop tasks but not add them",
                    tasks.len(),
                    draft_tasks.len()
                ),
            ));
        }

        Ok((tasks, notes))
    }

    /// A4: Optimization. Callers treat any error as a passthrough.
    async fn stage_a4(
        &self,
        request: &CareRequest,
        reviewed_tasks: &[CareTask],
        ctx: &StageContext,
    ) -> Result<Vec<CareTask>, EngineError> {
        info!(stage = %Stage::A4, "Executing {}", Stage::A4.title());

        let input = format!(
            "Tasks to Optimize ({} tasks):\n{}\n\nOptimization Goals:\n- Remove duplicates\n- Improve clarity\n- Ensure logical organization\n",
            reviewed_tasks.len(),
            tasks_as_json(reviewed_tasks),
        );

        let response = self.call_stage(Stage::A4, &input, ctx).await?;
        let payload: RevisedTasksPayload = parse_payload(Stage::A4, &response)?;
        let tasks = materialize_tasks(request, payload.tasks, reviewed_tasks);

        if tasks.is_empty() {
            return Err(EngineError::stage(Stage::A4, "no valid tasks in response"));
        }

        Ok(tasks)
    }

    /// A5: Review packet assembly.
    async fn stage_a5(
        &self,
        request: &CareRequest,
        final_tasks: &[CareTask],
        needs_map: &NeedsMap,
        review_notes: String,
    ) -> Result<ReviewPacket, EngineError> {
        info!(stage = %Stage::A5, "Executing {}", Stage::A5.title());

        let ctx = StageContext {
            constraints: request.constraints.clone(),
            boundaries: request.boundaries.clone(),
        };
        let input = format!(
            "Finalized Tasks ({} tasks):\n{}\n\nOriginal Needs Analysis:\n{}\n\nCare Request ID: {}\n\nCreate a review packet for the organizer.\n",
            final_tasks.len(),
            tasks_as_json(final_tasks),
            needs_map.summary,
            request.id,
        );

        let response = self.call_stage(Stage::A5, &input, &ctx).await?;
        let payload: ReviewPacketPayload = parse_payload(Stage::A5, &response)?;

        // Prefer the assembler's task list when it provides one; fall back
        // to the tasks the pipeline already settled on.
        let draft_tasks = match payload.draft_tasks {
            Some(payloads) if !payloads.is_empty() => {
                materialize_tasks(request, payloads, final_tasks)
            }
            _ => final_tasks.to_vec(),
        };

        let agent_notes = if payload.agent_notes.is_empty() {
            review_notes
        } else {
            payload.agent_notes
        };
        let suggested_plan_name = payload
            .suggested_plan_name
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty());

        Ok(ReviewPacket {
            id: PacketId::generate(),
            care_request_id: request.id.clone(),
            suggested_plan_name,
            summary: payload.summary,
            draft_tasks,
            agent_notes,
            approval_status: ApprovalStatus::Pending,
            created_at: Utc::now(),
        })
    }

    async fn call_stage(
        &self,
        stage: Stage,
        input: &str,
        ctx: &StageContext,
    ) -> Result<String, EngineError> {
        self.executor
            .run_stage(stage, input, ctx)
            .await
            .map_err(|err| EngineError::stage(stage, err.to_string()))
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    stage: Stage,
    response: &str,
) -> Result<T, EngineError> {
    let value = extract_json(response).map_err(|err| EngineError::stage(stage, err))?;
    serde_json::from_value(value).map_err(|err| {
        EngineError::stage(stage, format!("response JSON has unexpected shape: {err}"))
    })
}

/// Turn parsed task payloads into draft tasks, preserving the identity of
/// a prior task when the title matches case-insensitively. Each prior
/// identity is consumed at most once, so duplicate titles in the payload
/// still yield distinct tasks.
fn materialize_tasks(
    request: &CareRequest,
    payloads: Vec<TaskPayload>,
    previous: &[CareTask],
) -> Vec<CareTask> {
    let mut unmatched: Vec<&CareTask> = previous.iter().collect();
    payloads
        .into_iter()
        .filter(|payload| !payload.title.trim().is_empty())
        .map(|payload| {
            let task = CareTask::draft(
                request.id.clone(),
                payload.title.trim(),
                payload.description,
                payload.category.to_lowercase(),
                TaskPriority::from_agent_text(&payload.priority),
            );
            match unmatched
                .iter()
                .position(|prior| prior.title.eq_ignore_ascii_case(&task.title))
            {
                Some(index) => {
                    let prior = unmatched.swap_remove(index);
                    task.with_id(prior.id.clone())
                }
                None => task,
            }
        })
        .collect()
}

fn tasks_as_json(tasks: &[CareTask]) -> String {
    let items: Vec<serde_json::Value> = tasks
        .iter()
        .map(|task| {
            serde_json::json!({
                "title": task.title,
                "description": task.description,
                "category": task.category,
                "priority": task.priority,
            })
        })
        .collect();
    serde_json::to_string_pretty(&items).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::testing::ScriptedExecutor;
    use carecircle_core::TaskStatus;

    struct NoProgress;

    #[async_trait]
    impl ProgressSink for NoProgress {
        async fn stage_progress(&self, _stage: Stage, _status: &str) {}
    }

    fn a1_response() -> &'static str {
        r#"{"summary": "Recovery support", "identified_needs": {"meals": ["weekday dinners"]}, "risks": {"mobility": "limited"}, "assumptions": "lives alone"}"#
    }

    fn a2_response() -> &'static str {
        r#"[{"title": "Cook dinner", "description": "Weekday dinners", "category": "Meals", "priority": "high"},
            {"title": "Drive to checkup", "description": "Friday appointment", "category": "Transport", "priority": "medium"}]"#
    }

    fn a3_response() -> &'static str {
        r#"{"tasks": [{"title": "Cook dinner", "description": "Weekday dinners, no dairy", "category": "meals", "priority": "high"},
                      {"title": "Drive to checkup", "description": "Friday appointment", "category": "transport", "priority": "medium"}],
            "review_notes": "checked against boundaries"}"#
    }

    fn a4_response() -> &'static str {
        r#"{"tasks": [{"title": "Cook dinner", "description": "Weekday dinners, no dairy", "category": "meals", "priority": "high"},
                      {"title": "Drive to checkup", "description": "Friday appointment", "category": "transport", "priority": "medium"}],
            "optimization_notes": "no duplicates"}"#
    }

    fn a5_response() -> &'static str {
        r#"{"summary": "Two tasks covering meals and transport", "suggested_plan_name": "Recovery plan", "agent_notes": "ready for review"}"#
    }

    fn request() -> CareRequest {
        CareRequest::new(
            "Mom is recovering from hip surgery and needs help with meals and rides.",
            Some("weekday evenings only".into()),
            Some("no overnight visits".into()),
        )
        .unwrap()
    }

    fn orchestrator_with(executor: ScriptedExecutor) -> (Arc<Store>, PipelineOrchestrator) {
        let store = Store::new();
        let orchestrator = PipelineOrchestrator::new(
            store.clone(),
            Arc::new(executor),
            EngineConfig::default(),
        );
        (store, orchestrator)
    }

    #[tokio::test]
    async fn test_full_pipeline_produces_pending_packet() {
        let executor = ScriptedExecutor::new()
            .respond(Stage::A1, a1_response())
            .respond(Stage::A2, a2_response())
            .respond(Stage::A3, a3_response())
            .respond(Stage::A4, a4_response())
            .respond(Stage::A5, a5_response());
        let (store, orchestrator) = orchestrator_with(executor);

        let request = store.create_request(request()).await;
        let packet = orchestrator.run(&request, &NoProgress).await.unwrap();

        assert_eq!(packet.approval_status, ApprovalStatus::Pending);
        assert_eq!(packet.draft_tasks.len(), 2);
        assert_eq!(packet.suggested_plan_name.as_deref(), Some("Recovery plan"));
        assert!(packet
            .draft_tasks
            .iter()
            .all(|task| task.status == TaskStatus::Draft));

        // Each stage's artifact was persisted.
        assert!(store.get_needs_map(&request.id).await.is_some());
        assert!(store
            .get_review_packet(&packet.id)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_short_narrative_fails_before_calling_executor() {
        // No scripted responses at all: the executor must never be called.
        let (store, orchestrator) = orchestrator_with(ScriptedExecutor::new());
        let request = store
            .create_request(CareRequest::new("Too short.", None, None).unwrap())
            .await;

        let err = orchestrator.run(&request, &NoProgress).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientInput(_)));
        assert!(store.get_needs_map(&request.id).await.is_none());
    }

    #[tokio::test]
    async fn test_multibyte_narrative_minimum_counts_characters() {
        // 10 characters but 30 bytes: still below the minimum, and the
        // executor must never be called.
        let (store, orchestrator) = orchestrator_with(ScriptedExecutor::new());
        let request = store
            .create_request(CareRequest::new("あ".repeat(10), None, None).unwrap())
            .await;

        let err = orchestrator.run(&request, &NoProgress).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientInput(_)));
    }

    #[tokio::test]
    async fn test_a1_prose_response_is_fatal() {
        let executor =
            ScriptedExecutor::new().respond(Stage::A1, "Sorry, I cannot analyze this.");
        let (store, orchestrator) = orchestrator_with(executor);
        let request = store.create_request(request()).await;

        let err = orchestrator.run(&request, &NoProgress).await.unwrap_err();
        assert!(matches!(err, EngineError::Stage { stage: Stage::A1, .. }));
    }

    #[tokio::test]
    async fn test_a4_failure_passes_guardian_output_through() {
        let executor = ScriptedExecutor::new()
            .respond(Stage::A1, a1_response())
            .respond(Stage::A2, a2_response())
            .respond(Stage::A3, a3_response())
            .fail(Stage::A4, "optimizer unavailable")
            .respond(Stage::A5, a5_response());
        let (store, orchestrator) = orchestrator_with(executor);
        let request = store.create_request(request()).await;

        let packet = orchestrator.run(&request, &NoProgress).await.unwrap();
        assert_eq!(packet.draft_tasks.len(), 2);
        assert!(packet
            .draft_tasks
            .iter()
            .any(|task| task.description.contains("no dairy")));
    }

    #[tokio::test]
    async fn test_a3_may_not_add_tasks() {
        let inflated = r#"{"tasks": [
            {"title": "Cook dinner"}, {"title": "Drive to checkup"}, {"title": "Invented extra"}
        ]}"#;
        let executor = ScriptedExecutor::new()
            .respond(Stage::A1, a1_response())
            .respond(Stage::A2, a2_response())
            .respond(Stage::A3, inflated);
        let (store, orchestrator) = orchestrator_with(executor);
        let request = store.create_request(request()).await;

        let err = orchestrator.run(&request, &NoProgress).await.unwrap_err();
        assert!(matches!(err, EngineError::Stage { stage: Stage::A3, .. }));
    }

    #[test]
    fn test_duplicate_titles_consume_prior_identity_once() {
        let request = request();
        let prior = vec![CareTask::draft(
            request.id.clone(),
            "Cook dinner",
            "Weekday dinners",
            "meals",
            TaskPriority::High,
        )];
        let payloads = vec![
            TaskPayload {
                title: "Cook dinner".into(),
                description: "Weekday dinners".into(),
                category: "meals".into(),
                priority: "high".into(),
            },
            TaskPayload {
                title: "cook dinner".into(),
                description: "Weekend dinners".into(),
                category: "meals".into(),
                priority: "low".into(),
            },
        ];

        let tasks = materialize_tasks(&request, payloads, &prior);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, prior[0].id);
        assert_ne!(tasks[1].id, prior[0].id);
    }

    #[tokio::test]
    async fn test_a3_preserves_task_identity_by_title() {
        let executor = ScriptedExecutor::new()
            .respond(Stage::A1, a1_response())
            .respond(Stage::A2, a2_response())
            .respond(Stage::A3, a3_response())
            .respond(Stage::A4, a4_response())
            .respond(Stage::A5, a5_response());
        let (store, orchestrator) = orchestrator_with(executor);
        let request = store.create_request(request()).await;

        let packet = orchestrator.run(&request, &NoProgress).await.unwrap();
        let cook = packet
            .draft_tasks
            .iter()
            .find(|task| task.title == "Cook dinner")
            .unwrap();
        // The revised description flowed through while keeping one task
        // identity across A2 -> A5.
        assert!(cook.description.contains("no dairy"));
        assert_eq!(store.get_task(&cook.id).await.unwrap().title, "Cook dinner");
    }
}
