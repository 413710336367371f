//! Ledger trait and error types
//!
//! This module defines the trait interface for ledger backends and the
//! persistence error raised when a write cannot be made durable.

use crate::state::{Checkpoint, FailureRecord, ResultRecord};
use crate::storage::{LedgerCounts, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during ledger operations
///
/// Any of these during a run is a persistence failure: the orchestrator
/// retries the write once and then aborts, since progress that cannot be
/// recorded cannot be resumed.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Trait for progress ledger implementations
///
/// Records are append-only. Readers that need "the" result of an item take
/// the most recently appended record for its id.
pub trait Ledger {
    // ===== Run Management =====

    /// Records the start of a run and returns its ID
    fn begin_run(
        &mut self,
        config_hash: &str,
        start_index: usize,
        total_items: usize,
    ) -> LedgerResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> LedgerResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> LedgerResult<Option<RunRecord>>;

    /// Sets the final status and finish timestamp of a run
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> LedgerResult<()>;

    // ===== Results =====

    /// Durably appends a batch of terminal results
    ///
    /// The batch is written atomically: either every record (and the failure
    /// entry of every failed record) is stored, or none is.
    fn append(&mut self, run_id: i64, records: &[ResultRecord]) -> LedgerResult<()>;

    /// Latest record per item id, ordered by input position
    fn latest_results(&self) -> LedgerResult<Vec<ResultRecord>>;

    /// Every record appended by one run, in append order
    fn results_for_run(&self, run_id: i64) -> LedgerResult<Vec<ResultRecord>>;

    /// Failed items whose latest record is still a failure
    fn pending_failures(&self) -> LedgerResult<Vec<FailureRecord>>;

    // ===== Checkpoints =====

    /// Persists the resume cursor
    fn checkpoint(
        &mut self,
        run_id: i64,
        cursor_index: usize,
        result_count: u64,
    ) -> LedgerResult<Checkpoint>;

    /// Most recent checkpoint across all runs
    fn load_latest(&self) -> LedgerResult<Option<Checkpoint>>;

    /// Checkpoints written by one run, oldest first
    fn checkpoints_for_run(&self, run_id: i64) -> LedgerResult<Vec<Checkpoint>>;

    // ===== Statistics =====

    /// Aggregate record counts
    fn counts(&self) -> LedgerResult<LedgerCounts>;
}
