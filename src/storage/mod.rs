//! Storage module for the progress ledger
//!
//! This module handles all database operations for a harvest, including:
//! - SQLite database initialization and schema management
//! - Append-only result and failure records
//! - Resume checkpoints
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteLedger;
pub use traits::{Ledger, LedgerError, LedgerResult};

use std::path::Path;

/// Opens (or creates) a ledger database
pub fn open_ledger(path: &Path) -> LedgerResult<SqliteLedger> {
    SqliteLedger::new(path)
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub start_index: usize,
    pub total_items: usize,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Aggregate counts over the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    /// Every record ever appended, superseded ones included
    pub total_records: u64,

    /// Distinct item ids with at least one record
    pub unique_items: u64,

    /// Items whose latest record is a success
    pub succeeded: u64,

    /// Items whose latest record is a failure
    pub failed: u64,
}
