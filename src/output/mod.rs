//! Output module for reports and exports
//!
//! This module handles:
//! - Exporting the latest result per item and the pending failures as CSV
//! - Generating markdown summaries of the latest run
//! - Printing ledger statistics

mod export;
mod markdown;
pub mod stats;
mod summary;

pub use export::{export_failures, export_results, write_failures_csv, write_results_csv};
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use stats::{load_statistics, print_statistics, LedgerStatistics};
pub use summary::{generate_summary, RunSummary};

use crate::storage::LedgerError;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("No harvest runs found in the ledger")]
    NoRuns,
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
