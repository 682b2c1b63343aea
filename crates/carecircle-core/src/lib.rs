//! CareCircle Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Database
//! - Runtime specifics
//!
//! All types here represent the core business domain of CareCircle:
//! care requests, the pipeline job that processes them, the generated
//! tasks and review artifacts, and the per-task event diary.

pub mod error;
pub mod event;
pub mod ids;
pub mod job;
pub mod needs;
pub mod request;
pub mod review;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use event::{CareTaskEvent, TaskEventType};
pub use ids::{EventId, JobId, PacketId, PlanId, RequestId, TaskId, UserId};
pub use job::{Job, JobResult};
pub use needs::NeedsMap;
pub use request::CareRequest;
pub use review::{CarePlan, ReviewPacket};
pub use status::{ApprovalStatus, JobStatus, PlanStatus, RequestStatus, TaskPriority, TaskStatus};
pub use task::CareTask;
