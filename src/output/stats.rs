//! Statistics from the ledger database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::output::OutputResult;
use crate::state::Checkpoint;
use crate::storage::{Ledger, LedgerCounts, RunRecord};

/// Ledger statistics summary
#[derive(Debug, Clone)]
pub struct LedgerStatistics {
    pub counts: LedgerCounts,

    /// Latest run, if any
    pub latest_run: Option<RunRecord>,

    /// Latest resume checkpoint, if any
    pub checkpoint: Option<Checkpoint>,

    /// Items whose latest record is a failure
    pub pending_failures: u64,
}

/// Loads statistics from a ledger
pub fn load_statistics(ledger: &dyn Ledger) -> OutputResult<LedgerStatistics> {
    Ok(LedgerStatistics {
        counts: ledger.counts()?,
        latest_run: ledger.get_latest_run()?,
        checkpoint: ledger.load_latest()?,
        pending_failures: ledger.pending_failures()?.len() as u64,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &LedgerStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Items with results: {}", stats.counts.unique_items);
    println!("  Records written: {}", stats.counts.total_records);
    let rate = if stats.counts.unique_items > 0 {
        stats.counts.succeeded as f64 / stats.counts.unique_items as f64 * 100.0
    } else {
        0.0
    };
    println!("  Succeeded: {} ({:.1}%)", stats.counts.succeeded, rate);
    println!("  Failed: {}", stats.counts.failed);
    println!("  Pending replay: {}", stats.pending_failures);
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run:");
            println!("  ID: {}", run.id);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            println!("  Items: {} (from index {})", run.total_items, run.start_index);
        }
        None => println!("No runs recorded yet."),
    }

    if let Some(checkpoint) = &stats.checkpoint {
        println!();
        println!("Resume Checkpoint:");
        println!("  Cursor: {}", checkpoint.cursor_index);
        println!("  Written: {}", checkpoint.written_at.to_rfc3339());
    }

    println!();
}
