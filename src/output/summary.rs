//! Run summary assembled from the ledger

use crate::output::{OutputError, OutputResult};
use crate::storage::{Ledger, LedgerCounts};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// How many distinct failure reasons a summary lists
const TOP_REASONS: usize = 10;

/// Everything a report needs about the latest run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_seconds: Option<u64>,
    pub status: String,
    pub config_hash: String,

    pub start_index: usize,
    pub total_items: usize,

    /// Latest resume cursor in the ledger
    pub cursor_index: Option<usize>,

    /// Records appended by this run
    pub run_records: u64,
    pub run_succeeded: u64,
    pub run_failed: u64,

    /// Latest-record-per-item counts over the whole ledger
    pub ledger: LedgerCounts,

    /// Items still waiting for a replay
    pub pending_failures: u64,

    /// Most frequent reasons among pending failures, descending
    pub top_failure_reasons: Vec<(String, u64)>,
}

impl RunSummary {
    /// Success rate of this run's records (percent)
    pub fn success_rate(&self) -> f64 {
        if self.run_records == 0 {
            0.0
        } else {
            self.run_succeeded as f64 / self.run_records as f64 * 100.0
        }
    }

    /// Share of the item list behind the resume cursor (percent)
    pub fn coverage(&self) -> f64 {
        match self.cursor_index {
            Some(cursor) if self.total_items > 0 => {
                cursor.min(self.total_items) as f64 / self.total_items as f64 * 100.0
            }
            _ => 0.0,
        }
    }
}

/// Builds a summary of the latest run
pub fn generate_summary(ledger: &dyn Ledger) -> OutputResult<RunSummary> {
    let run = ledger.get_latest_run()?.ok_or(OutputError::NoRuns)?;

    let duration_seconds = match (
        run.started_at.parse::<DateTime<Utc>>(),
        run.finished_at.as_deref().map(str::parse::<DateTime<Utc>>),
    ) {
        (Ok(started), Some(Ok(finished))) => {
            Some((finished - started).num_seconds().max(0) as u64)
        }
        _ => None,
    };

    let records = ledger.results_for_run(run.id)?;
    let run_succeeded = records.iter().filter(|r| r.is_success()).count() as u64;
    let run_records = records.len() as u64;

    let failures = ledger.pending_failures()?;
    let mut reasons: HashMap<&str, u64> = HashMap::new();
    for failure in &failures {
        *reasons.entry(failure.reason.as_str()).or_default() += 1;
    }
    let mut top_failure_reasons: Vec<(String, u64)> = reasons
        .into_iter()
        .map(|(reason, count)| (reason.to_string(), count))
        .collect();
    top_failure_reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_failure_reasons.truncate(TOP_REASONS);

    Ok(RunSummary {
        run_id: run.id,
        started_at: run.started_at,
        finished_at: run.finished_at,
        duration_seconds,
        status: run.status.to_db_string().to_string(),
        config_hash: run.config_hash,
        start_index: run.start_index,
        total_items: run.total_items,
        cursor_index: ledger.load_latest()?.map(|c| c.cursor_index),
        run_records,
        run_succeeded,
        run_failed: run_records - run_succeeded,
        ledger: ledger.counts()?,
        pending_failures: failures.len() as u64,
        top_failure_reasons,
    })
}
