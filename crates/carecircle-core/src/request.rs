//! Care request: the caregiving narrative submitted for processing.

use crate::error::CoreError;
use crate::ids::RequestId;
use crate::status::RequestStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum narrative length in characters.
pub const MAX_NARRATIVE_LEN: usize = 5_000;
/// Maximum constraints length in characters.
pub const MAX_CONSTRAINTS_LEN: usize = 2_000;
/// Maximum boundaries length in characters.
pub const MAX_BOUNDARIES_LEN: usize = 2_000;

/// The initial caregiving narrative submitted by an organizer.
///
/// The narrative is immutable once submitted; only `status` changes, and
/// only the pipeline subsystem changes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareRequest {
    /// Unique request identifier.
    pub id: RequestId,

    /// The caregiving situation narrative.
    pub narrative: String,

    /// Timing and scheduling constraints, if any.
    pub constraints: Option<String>,

    /// Privacy concerns and boundaries, if any.
    pub boundaries: Option<String>,

    /// Current status of the request.
    pub status: RequestStatus,

    /// When the request was submitted.
    pub created_at: DateTime<Utc>,
}

impl CareRequest {
    /// Create a new request, trimming and validating the submitted text.
    pub fn new(
        narrative: impl Into<String>,
        constraints: Option<String>,
        boundaries: Option<String>,
    ) -> Result<Self, CoreError> {
        let narrative = narrative.into().trim().to_owned();
        if narrative.is_empty() {
            return Err(CoreError::InvalidInput("narrative cannot be empty".into()));
        }
        if narrative.chars().count() > MAX_NARRATIVE_LEN {
            return Err(CoreError::InvalidInput(format!(
                "narrative exceeds maximum length of {MAX_NARRATIVE_LEN}"
            )));
        }

        let constraints = normalize_optional(constraints, MAX_CONSTRAINTS_LEN, "constraints")?;
        let boundaries = normalize_optional(boundaries, MAX_BOUNDARIES_LEN, "boundaries")?;

        Ok(Self {
            id: RequestId::generate(),
            narrative,
            constraints,
            boundaries,
            status: RequestStatus::Submitted,
            created_at: Utc::now(),
        })
    }
}

fn normalize_optional(
    value: Option<String>,
    max_len: usize,
    field: &str,
) -> Result<Option<String>, CoreError> {
    match value {
        Some(v) => {
            if v.chars().count() > max_len {
                return Err(CoreError::InvalidInput(format!(
                    "{field} exceeds maximum length of {max_len}"
                )));
            }
            let trimmed = v.trim();
            Ok(if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            })
        }
        None => Ok(None),
    }
}
