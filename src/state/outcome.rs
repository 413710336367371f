//! Extraction outcomes and the records built from them

use crate::state::WorkItem;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Extracted field values, keyed by field name
pub type FieldMap = BTreeMap<String, String>;

/// Result of a single extraction attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// The item page was fetched and its fields read
    Success { fields: FieldMap, elapsed_millis: u64 },

    /// The attempt did not produce usable data
    Failure { reason: String, elapsed_millis: u64 },
}

impl ExtractionOutcome {
    pub fn success(fields: FieldMap, elapsed_millis: u64) -> Self {
        Self::Success {
            fields,
            elapsed_millis,
        }
    }

    pub fn failure(reason: impl Into<String>, elapsed_millis: u64) -> Self {
        Self::Failure {
            reason: reason.into(),
            elapsed_millis,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn elapsed_millis(&self) -> u64 {
        match self {
            Self::Success { elapsed_millis, .. } | Self::Failure { elapsed_millis, .. } => {
                *elapsed_millis
            }
        }
    }

    /// Database string for the outcome kind
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failure { .. } => "failure",
        }
    }
}

/// Terminal result for one work item
///
/// Written once the item's attempt sequence has ended, never updated. A later
/// run may append a newer record for the same item id; readers keep the last.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub item: WorkItem,

    /// Index of the item in the input list
    pub position: usize,

    pub outcome: ExtractionOutcome,

    /// Attempts consumed, at most `max_retries + 1`
    pub attempt_count: u32,

    pub finalized_at: DateTime<Utc>,
}

impl ResultRecord {
    pub fn new(
        item: WorkItem,
        position: usize,
        outcome: ExtractionOutcome,
        attempt_count: u32,
    ) -> Self {
        Self {
            item,
            position,
            outcome,
            attempt_count,
            finalized_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Replay entry for a failed record
    pub fn to_failure(&self) -> Option<FailureRecord> {
        match &self.outcome {
            ExtractionOutcome::Failure { reason, .. } => Some(FailureRecord {
                item: self.item.clone(),
                position: self.position,
                reason: reason.clone(),
                attempt_count: self.attempt_count,
                finalized_at: self.finalized_at,
            }),
            ExtractionOutcome::Success { .. } => None,
        }
    }
}

/// An item whose attempts were exhausted, kept for replay
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub item: WorkItem,
    pub position: usize,
    pub reason: String,
    pub attempt_count: u32,
    pub finalized_at: DateTime<Utc>,
}
