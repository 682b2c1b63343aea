//! Pipeline stages and the opaque stage executor boundary.
//!
//! The engine never generates content itself. Each stage hands an input
//! text and an immutable [`StageContext`] to a [`StageExecutor`] and gets
//! raw text back. Executors are expected to answer with JSON, either bare
//! or inside a Markdown code fence; [`extract_json`] normalizes both.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// One of the five fixed pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Intake & needs analysis.
    A1,
    /// Task generation.
    A2,
    /// Guardian & quality pass.
    A3,
    /// Optimization (optional; failure is non-fatal).
    A4,
    /// Review packet assembly.
    A5,
}

impl Stage {
    /// Short stage name used in progress maps and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::A3 => "A3",
            Self::A4 => "A4",
            Self::A5 => "A5",
        }
    }

    /// Human-readable stage title.
    pub fn title(&self) -> &'static str {
        match self {
            Self::A1 => "Intake & Needs Analysis",
            Self::A2 => "Task Generation",
            Self::A3 => "Guardian & Quality Pass",
            Self::A4 => "Optimization",
            Self::A5 => "Review Packet Assembly",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Immutable context threaded through every stage call.
///
/// Carries the request's constraints and boundaries so each stage can be
/// tested independently; stages never share mutable state.
#[derive(Debug, Clone, Default)]
pub struct StageContext {
    /// Timing and scheduling constraints from the care request.
    pub constraints: Option<String>,

    /// Privacy concerns and boundaries from the care request.
    pub boundaries: Option<String>,
}

impl StageContext {
    /// Constraints text, or a placeholder when none were given.
    pub fn constraints_text(&self) -> &str {
        self.constraints.as_deref().unwrap_or("None specified")
    }

    /// Boundaries text, or a placeholder when none were given.
    pub fn boundaries_text(&self) -> &str {
        self.boundaries.as_deref().unwrap_or("None specified")
    }
}

/// Error raised by a stage executor.
#[derive(Debug, Error)]
pub enum StageError {
    /// The executor failed to produce a response.
    #[error("stage executor failed: {0}")]
    Executor(String),
}

/// The opaque external agent-stage executor.
///
/// Implementations wrap whatever actually computes stage output (a
/// language-model agent, a subprocess, a scripted test double). The
/// orchestrator only depends on this boundary.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Run one stage against the given input text and context, returning
    /// the raw response text.
    async fn run_stage(
        &self,
        stage: Stage,
        input: &str,
        ctx: &StageContext,
    ) -> Result<String, StageError>;
}

/// Extract a JSON value from executor response text.
///
/// Accepts bare JSON or JSON wrapped in a Markdown code fence
/// (```` ```json ... ``` ```` or ```` ``` ... ``` ````).
pub fn extract_json(text: &str) -> Result<Value, String> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return Ok(value);
        }
    }

    if let Some(fenced) = extract_fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str(fenced.trim()) {
            return Ok(value);
        }
    }

    let preview: String = trimmed.chars().take(200).collect();
    Err(format!(
        "no valid JSON found in response; response must be valid JSON only, got: {preview}"
    ))
}

/// Return the content of the first fenced code block, if any.
fn extract_fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip an optional language tag on the fence line.
    let content_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let content = &after_fence[content_start..];
    let close = content.find("```")?;
    Some(&content[..close])
}

/// A1 response payload.
#[derive(Debug, Deserialize)]
pub(crate) struct NeedsMapPayload {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub identified_needs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub risks: BTreeMap<String, String>,
    #[serde(default)]
    pub assumptions: String,
}

/// One task object as produced by A2-A5.
#[derive(Debug, Deserialize)]
pub(crate) struct TaskPayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_priority")]
    pub priority: String,
}

fn default_category() -> String {
    "general".to_owned()
}

fn default_priority() -> String {
    "medium".to_owned()
}

/// A2 responds with either a bare array or an object with a `tasks` field.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum TaskListPayload {
    Bare(Vec<TaskPayload>),
    Wrapped(RevisedTasksPayload),
}

impl TaskListPayload {
    pub fn into_tasks(self) -> Vec<TaskPayload> {
        match self {
            Self::Bare(tasks) => tasks,
            Self::Wrapped(wrapped) => wrapped.tasks,
        }
    }
}

/// A3/A4 response payload: revised tasks plus optional rationale notes.
#[derive(Debug, Deserialize)]
pub(crate) struct RevisedTasksPayload {
    pub tasks: Vec<TaskPayload>,
    #[serde(default, alias = "optimization_notes")]
    pub review_notes: String,
}

/// A5 response payload.
#[derive(Debug, Deserialize)]
pub(crate) struct ReviewPacketPayload {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub suggested_plan_name: Option<String>,
    #[serde(default)]
    pub agent_notes: String,
    #[serde(default)]
    pub draft_tasks: Option<Vec<TaskPayload>>,
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted executor for deterministic pipeline tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A stage executor that replays canned responses per stage.
    pub struct ScriptedExecutor {
        responses: Mutex<HashMap<Stage, Vec<Result<String, String>>>>,
    }

    impl ScriptedExecutor {
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
            }
        }

        /// Queue a successful response for a stage.
        pub fn respond(self, stage: Stage, body: impl Into<String>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(stage)
                .or_default()
                .push(Ok(body.into()));
            self
        }

        /// Queue a failure for a stage.
        pub fn fail(self, stage: Stage, message: impl Into<String>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(stage)
                .or_default()
                .push(Err(message.into()));
            self
        }
    }

    #[async_trait]
    impl StageExecutor for ScriptedExecutor {
        async fn run_stage(
            &self,
            stage: Stage,
            _input: &str,
            _ctx: &StageContext,
        ) -> Result<String, StageError> {
            let mut responses = self.responses.lock().unwrap();
            let next = responses
                .get_mut(&stage)
                .filter(|queue| !queue.is_empty())
                .map(|queue| queue.remove(0));
            match next {
                Some(Ok(body)) => Ok(body),
                Some(Err(message)) => Err(StageError::Executor(message)),
                None => Err(StageError::Executor(format!(
                    "no scripted response for stage {stage}"
                ))),
            }
        }
    }
}
