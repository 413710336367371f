//! Harvest module - the extraction orchestration engine
//!
//! This module contains the run loop and its policies:
//! - Bounded retry with linear backoff around each extraction
//! - Adaptive inter-request pacing from the rolling success rate
//! - Progress tracking, buffered persistence and checkpointing
//! - Overall run orchestration with cooperative cancellation

mod orchestrator;
mod pacing;
mod progress;
mod retry;

pub use orchestrator::{Orchestrator, RunReport};
pub use pacing::{random_between, PaceBand, RateController};
pub use progress::{FlushBatch, ProgressTracker};
pub use retry::{AttemptReport, MarkerClassifier, RetryClassifier, RetryController, Verdict};
