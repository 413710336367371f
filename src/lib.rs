//! Ripple-Harvest: a patient bulk extraction engine
//!
//! This crate turns a static list of work items into a durable, resumable
//! extraction run against a rate-limited remote source, with bounded retries,
//! adaptive pacing, periodic session renewal and checkpointed progress.

pub mod config;
pub mod extractor;
pub mod harvest;
pub mod input;
pub mod output;
pub mod session;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Ripple-Harvest operations
///
/// Per-item extraction failures never surface here: they are captured as
/// [`state::ExtractionOutcome::Failure`] data. Only configuration, input,
/// session and ledger failures terminate a run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Input error: {0}")]
    Input(#[from] input::InputError),

    #[error("Session error: {0}")]
    Session(#[from] session::SessionError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] storage::LedgerError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector for field '{field}': {message}")]
    InvalidSelector { field: String, message: String },
}

/// Result type alias for Ripple-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use harvest::{Orchestrator, RunReport};
pub use state::{Checkpoint, ExtractionOutcome, ResultRecord, RunState, WorkItem};
