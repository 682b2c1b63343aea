//! CareCircle Execution Engine
//!
//! Drives the conversion of a caregiving narrative into human-approved,
//! assignable tasks:
//!
//! - [`runner::JobRunner`] owns background execution of pipeline jobs,
//!   one spawned task per submitted care request.
//! - [`pipeline::PipelineOrchestrator`] runs the five fixed stages
//!   (A1 intake, A2 task generation, A3 guardian, A4 optimization,
//!   A5 assembly) against one request, persisting each stage's artifact.
//! - [`approval::ApprovalGate`] converts a pending review packet into an
//!   approved plan with claimable tasks, exactly once.
//! - [`lifecycle::TaskLifecycle`] governs claim/complete/release/reopen
//!   under concurrent helpers, appending to the per-task diary.
//! - [`store::Store`] is the backing store and single source of truth.
//!
//! Stage computation itself is opaque: it lives behind the
//! [`stage::StageExecutor`] trait.

pub mod approval;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pipeline;
pub mod runner;
pub mod stage;
pub mod store;

pub use approval::{ApprovalGate, TaskEdit};
pub use config::EngineConfig;
pub use error::EngineError;
pub use lifecycle::TaskLifecycle;
pub use pipeline::{PipelineOrchestrator, ProgressSink};
pub use runner::JobRunner;
pub use stage::{Stage, StageContext, StageError, StageExecutor};
pub use store::Store;
