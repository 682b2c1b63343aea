//! HTTP routes.
//!
//! Each route maps one-to-one onto an engine component method; this
//! layer only extracts the caller identity, translates JSON shapes, and
//! maps engine errors to HTTP statuses. No business rules live here.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use carecircle_core::{
    CareRequest, CareTask, CoreError, JobId, PacketId, PlanId, RequestId, TaskId, UserId,
};
use carecircle_engine::{EngineError, TaskEdit};

use crate::state::AppState;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/care-requests", post(submit_care_request))
        .route("/v1/care-requests/:id", get(get_care_request))
        .route("/v1/jobs", get(list_jobs))
        .route("/v1/jobs/:id", get(get_job))
        .route("/v1/review-packets/:id", get(get_review_packet))
        .route("/v1/review-packets/:id/approve", post(approve_review_packet))
        .route("/v1/plans/:id", get(get_plan))
        .route("/v1/plans/:id/tasks", get(get_plan_tasks))
        .route("/v1/tasks/available", get(available_tasks))
        .route("/v1/tasks/mine", get(my_tasks))
        .route("/v1/tasks/:id", get(get_task))
        .route("/v1/tasks/:id/events", get(get_task_events))
        .route("/v1/tasks/:id/claim", post(claim_task))
        .route("/v1/tasks/:id/status", post(add_task_status))
        .route("/v1/tasks/:id/complete", post(complete_task))
        .route("/v1/tasks/:id/release", post(release_task))
        .route("/v1/tasks/:id/reopen", post(reopen_task))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Caller identity from the `x-user-id` header.
///
/// Authentication itself is external to this service; the header carries
/// the already-authenticated principal.
pub struct Actor(pub UserId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Actor(UserId::new(value)))
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse {
                        error: "missing x-user-id header".to_string(),
                        indices: None,
                    }),
                )
                    .into_response()
            })
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<usize>>,
}

/// Engine error translated to an HTTP response.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(EngineError::InvalidInput(err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::InvalidInput(_)
            | EngineError::InsufficientInput(_)
            | EngineError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::JobConflict(_)
            | EngineError::AlreadyApproved(_)
            | EngineError::TaskAlreadyClaimed(_)
            | EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
            EngineError::ForbiddenTransition(_) => StatusCode::FORBIDDEN,
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::Stage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let indices = match &self.0 {
            EngineError::Validation { indices, .. } => Some(indices.clone()),
            _ => None,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                indices,
            }),
        )
            .into_response()
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> ApiError {
    ApiError(EngineError::NotFound {
        entity,
        id: id.to_string(),
    })
}

// ---- care requests & jobs ----

/// Request body for submitting a care request.
#[derive(Debug, Deserialize)]
struct SubmitRequest {
    narrative: String,
    #[serde(default)]
    constraints: Option<String>,
    #[serde(default)]
    boundaries: Option<String>,
}

/// Response body for a submitted care request.
#[derive(Debug, Serialize)]
struct SubmitResponse {
    request: CareRequest,
    job_id: JobId,
}

async fn submit_care_request(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Json(body): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = CareRequest::new(body.narrative, body.constraints, body.boundaries)?;
    let request = state.store.create_request(request).await;
    let job = state.runner.submit(&request.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            request,
            job_id: job.id,
        }),
    ))
}

async fn get_care_request(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = RequestId::new(id);
    let request = state
        .store
        .get_request(&id)
        .await
        .ok_or_else(|| not_found("Care request", &id))?;
    Ok(Json(request))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.runner.get_status(&JobId::new(id)).await?;
    Ok(Json(job))
}

async fn list_jobs(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.runner.list_jobs().await))
}

// ---- review packets & plans ----

async fn get_review_packet(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = PacketId::new(id);
    let packet = state
        .store
        .get_review_packet(&id)
        .await
        .ok_or_else(|| not_found("Review packet", &id))?;
    Ok(Json(packet))
}

/// One edited task in an approval request.
#[derive(Debug, Deserialize)]
struct TaskEditBody {
    #[serde(default)]
    id: Option<String>,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
    #[serde(default = "default_priority")]
    priority: String,
}

fn default_priority() -> String {
    "medium".to_string()
}

/// Request body for approving a review packet.
#[derive(Debug, Deserialize)]
struct ApproveRequest {
    #[serde(default)]
    plan_name: Option<String>,
    tasks: Vec<TaskEditBody>,
}

/// Response body for an approved plan.
#[derive(Debug, Serialize)]
struct ApproveResponse {
    plan: carecircle_core::CarePlan,
    tasks: Vec<CareTask>,
}

async fn approve_review_packet(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    Json(body): Json<ApproveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let edits: Vec<TaskEdit> = body
        .tasks
        .into_iter()
        .map(|task| TaskEdit {
            id: task.id.map(TaskId::new),
            title: task.title,
            description: task.description,
            category: task.category,
            priority: task.priority,
        })
        .collect();

    let plan = state
        .approval
        .approve(&PacketId::new(id), &actor, body.plan_name, edits)
        .await?;
    let tasks = state.store.tasks_by_plan(&plan.id).await;
    Ok(Json(ApproveResponse { plan, tasks }))
}

async fn get_plan(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = PlanId::new(id);
    let plan = state
        .store
        .get_plan(&id)
        .await
        .ok_or_else(|| not_found("Care plan", &id))?;
    let tasks = state.store.tasks_by_plan(&plan.id).await;
    Ok(Json(serde_json::json!({ "plan": plan, "tasks": tasks })))
}

async fn get_plan_tasks(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.tasks_by_plan(&PlanId::new(id)).await))
}

// ---- tasks ----

async fn available_tasks(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.available_tasks().await))
}

async fn my_tasks(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.tasks_by_claimant(&actor).await))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = TaskId::new(id);
    let task = state
        .store
        .get_task(&id)
        .await
        .ok_or_else(|| not_found("Care task", &id))?;
    Ok(Json(task))
}

async fn get_task_events(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.lifecycle.diary(&TaskId::new(id)).await))
}

async fn claim_task(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.lifecycle.claim(&TaskId::new(id), &actor).await?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    note: String,
}

async fn add_task_status(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Result<impl IntoResponse, ApiError> {
    let event = state
        .lifecycle
        .add_status(&TaskId::new(id), &actor, &body.note)
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

#[derive(Debug, Deserialize)]
struct CompleteBody {
    outcome: String,
}

async fn complete_task(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    Json(body): Json<CompleteBody>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .lifecycle
        .complete(&TaskId::new(id), &actor, &body.outcome)
        .await?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
struct ReasonBody {
    reason: String,
}

async fn release_task(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    Json(body): Json<ReasonBody>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .lifecycle
        .release(&TaskId::new(id), &actor, &body.reason)
        .await?;
    Ok(Json(task))
}

async fn reopen_task(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    Json(body): Json<ReasonBody>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .lifecycle
        .reopen(&TaskId::new(id), &actor, &body.reason)
        .await?;
    Ok(Json(task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (
                EngineError::InvalidInput("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                EngineError::JobConflict(RequestId::new("r")),
                StatusCode::CONFLICT,
            ),
            (
                EngineError::TaskAlreadyClaimed(TaskId::new("t")),
                StatusCode::CONFLICT,
            ),
            (
                EngineError::ForbiddenTransition("x".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                EngineError::NotFound {
                    entity: "Job",
                    id: "j".into(),
                },
                StatusCode::NOT_FOUND,
            ),
        ];
        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_validation_error_carries_indices() {
        let err = EngineError::Validation {
            indices: vec![0, 2],
            reason: "bad".into(),
        };
        let response = ApiError(err).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
