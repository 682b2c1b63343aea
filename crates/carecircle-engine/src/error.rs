//! Engine error taxonomy.
//!
//! Input and conflict errors are returned synchronously and change no
//! state. Stage errors are fatal to a job and surface only through the
//! job's terminal state, never across the async boundary.

use carecircle_core::{PacketId, RequestId, TaskId, TaskStatus};
use thiserror::Error;

use crate::stage::Stage;

/// Errors produced by the execution engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed caller input (empty payload, bad field).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Narrative too short for the intake stage to work with.
    #[error("Insufficient input: {0}")]
    InsufficientInput(String),

    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A non-terminal job already exists for this care request.
    #[error("A job is already in progress for care request {0}")]
    JobConflict(RequestId),

    /// The review packet was already approved; approval never reverts.
    #[error("Review packet {0} is already approved")]
    AlreadyApproved(PacketId),

    /// Edited tasks failed validation; indices identify the offenders.
    /// The approval call has no effect.
    #[error("Task validation failed at indices {indices:?}: {reason}")]
    Validation { indices: Vec<usize>, reason: String },

    /// Lost the claim race: the task was no longer available.
    #[error("Task {0} was already claimed by someone else")]
    TaskAlreadyClaimed(TaskId),

    /// The caller is not allowed to perform this transition.
    #[error("Forbidden transition: {0}")]
    ForbiddenTransition(String),

    /// The requested transition is not in the lifecycle table.
    #[error("Invalid task transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    /// A fatal pipeline stage failure (A1/A2/A3/A5).
    #[error("Stage {stage} failed: {message}")]
    Stage { stage: Stage, message: String },
}

impl EngineError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn stage(stage: Stage, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: message.into(),
        }
    }
}
