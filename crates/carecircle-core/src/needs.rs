//! Needs map: structured interpretation of a care request produced by A1.

use crate::ids::RequestId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured interpretation of a CareRequest produced by the intake stage.
///
/// Created once per pipeline run and never mutated by humans. A re-run of
/// the pipeline for the same request idempotently replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeedsMap {
    /// Associated care request.
    pub care_request_id: RequestId,

    /// High-level summary of the situation.
    pub summary: String,

    /// Identified needs, grouped by category.
    pub identified_needs: BTreeMap<String, Vec<String>>,

    /// Potential risks or concerns, by category.
    pub risks: BTreeMap<String, String>,

    /// Assumptions made during analysis.
    pub assumptions: String,

    /// When the map was produced.
    pub created_at: DateTime<Utc>,
}

impl NeedsMap {
    /// True when the map satisfies the intake stage's structural contract:
    /// a non-empty summary and at least one need category.
    pub fn is_structurally_valid(&self) -> bool {
        !self.summary.trim().is_empty() && !self.identified_needs.is_empty()
    }
}
