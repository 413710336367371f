//! State module for the harvest data model
//!
//! # Components
//!
//! - `WorkItem`: one unit of extraction (id + label)
//! - `ExtractionOutcome`, `ResultRecord`, `FailureRecord`: per-item results
//! - `Checkpoint`: the resume cursor
//! - `RunStats`: per-run counters for success rate, throughput and ETA
//! - `RunState`: run lifecycle

mod checkpoint;
mod outcome;
mod run_state;
mod stats;
mod work_item;

// Re-export main types
pub use checkpoint::Checkpoint;
pub use outcome::{ExtractionOutcome, FailureRecord, FieldMap, ResultRecord};
pub use run_state::RunState;
pub use stats::{format_eta, RunStats};
pub use work_item::WorkItem;
